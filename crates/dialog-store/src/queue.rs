//! Durable at-least-once hand-off of a finished dialog session to the analysis worker,
//! backed by RabbitMQ via `lapin`.
//!
//! The producer side (held by `dialog-engine`'s `DialogEngine`) publishes one message per
//! qualifying session and reconnects with exponential backoff on a dropped connection. The
//! consumer side (held by `dialog-analyzer`) sets `prefetch=1` and acks/nacks per message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use futures_util::StreamExt;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

const EXCHANGE: &str = "chat_history_senior";
const QUEUE: &str = "chat_history_senior";
const ROUTING_KEY: &str = "history.senior.end";
const CONSUMER_TAG: &str = "dialog-analyzer";

/// Backoff delays (seconds) between successive reconnect attempts. The sixth attempt
/// failing aborts the reconnect loop entirely.
pub const RECONNECT_BACKOFF_SECS: [u64; 6] = [1, 2, 4, 8, 16, 32];

/// `{session-id, start-unix, end-unix}`, the payload of one analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Session identifier the job covers.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Session start, Unix seconds.
    pub start: i64,
    /// Session end, Unix seconds.
    pub end: i64,
}

/// Producer capability: publish one analysis job.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish `job` as a persistent message. Serialized internally; safe to call
    /// concurrently from multiple sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is unusable and reconnection is exhausted.
    async fn publish(&self, job: &AnalysisJob) -> Result<()>;
}

/// The ack/nack capability of one delivered message, factored out of [`JobDelivery`] so the
/// analysis worker can be driven against an in-memory fake with no broker involved.
#[async_trait]
pub trait JobDeliveryHandle: Send + Sync {
    /// Acknowledge successful processing.
    async fn ack(&self) -> Result<()>;
    /// Negatively acknowledge, optionally requeuing for redelivery.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// One delivered job awaiting ack/nack.
pub struct JobDelivery {
    /// Parsed job payload, or `None` if the message body did not deserialize.
    pub job: Option<AnalysisJob>,
    handle: Box<dyn JobDeliveryHandle>,
}

impl JobDelivery {
    /// Build a delivery from a parsed (or unparseable) job and its ack/nack handle.
    #[must_use]
    pub fn new(job: Option<AnalysisJob>, handle: Box<dyn JobDeliveryHandle>) -> Self {
        Self { job, handle }
    }

    /// Acknowledge successful processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the ack cannot be delivered to the broker.
    pub async fn ack(&self) -> Result<()> {
        self.handle.ack().await
    }

    /// Negatively acknowledge, optionally requeuing for redelivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the nack cannot be delivered to the broker.
    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.handle.nack(requeue).await
    }
}

/// Consumer capability: drain the analysis job queue one delivery at a time.
#[async_trait]
pub trait JobConsumer: Send {
    /// Await the next delivery, or `None` if the consumer stream has ended.
    async fn next_delivery(&mut self) -> Result<Option<JobDelivery>>;
}

struct LapinDeliveryHandle(lapin::message::Delivery);

#[async_trait]
impl JobDeliveryHandle for LapinDeliveryHandle {
    async fn ack(&self) -> Result<()> {
        self.0.ack(BasicAckOptions::default()).await.map_err(StoreError::Amqp)
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.0
            .nack(BasicNackOptions { requeue, ..Default::default() })
            .await
            .map_err(StoreError::Amqp)
    }
}

/// A connection and the channel opened on it, kept together so the channel's backing I/O
/// loop stays alive for as long as the channel is in use.
struct Link {
    _connection: Connection,
    channel: Channel,
}

/// RabbitMQ-backed job queue, usable as both [`JobPublisher`] and (via
/// [`LapinJobQueue::consumer`]) a [`JobConsumer`] source.
#[derive(Clone)]
pub struct LapinJobQueue {
    url: String,
    link: Arc<Mutex<Link>>,
}

impl LapinJobQueue {
    /// Connect and declare the exchange/queue/binding, retrying with the documented backoff
    /// schedule on failure.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReconnectExhausted`] if all six attempts fail.
    pub async fn connect(config: &crate::config::RabbitMqConfig) -> Result<Self> {
        let link = dial_with_backoff(&config.url).await?;
        Ok(Self { url: config.url.clone(), link: Arc::new(Mutex::new(link)) })
    }

    /// Reconnect the underlying channel, retrying with the documented backoff schedule.
    async fn reconnect(&self) -> Result<()> {
        let fresh = dial_with_backoff(&self.url).await?;
        *self.link.lock().await = fresh;
        Ok(())
    }

    async fn publish_once(&self, body: &[u8]) -> Result<()> {
        let guard = self.link.lock().await;
        let confirm = guard
            .channel
            .basic_publish(
                EXCHANGE,
                ROUTING_KEY,
                lapin::options::BasicPublishOptions::default(),
                body,
                lapin::BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(StoreError::Amqp)?;
        confirm.await.map(|_| ()).map_err(StoreError::Amqp)
    }

    /// Open a dedicated consuming channel with `prefetch=1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel or consumer cannot be established.
    pub async fn consumer(&self) -> Result<LapinJobConsumer> {
        let conn_channel = self.link.lock().await.channel.clone();
        conn_channel.basic_qos(1, BasicQosOptions { global: false }).await.map_err(StoreError::Amqp)?;
        let consumer = conn_channel
            .basic_consume(
                QUEUE,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(StoreError::Amqp)?;
        Ok(LapinJobConsumer { inner: consumer })
    }
}

#[async_trait]
impl JobPublisher for LapinJobQueue {
    async fn publish(&self, job: &AnalysisJob) -> Result<()> {
        let body = serde_json::to_vec(job)?;
        match self.publish_once(&body).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.reconnect().await?;
                self.publish_once(&body).await
            }
        }
    }
}

/// A consuming handle over the analysis job queue.
pub struct LapinJobConsumer {
    inner: lapin::Consumer,
}

#[async_trait]
impl JobConsumer for LapinJobConsumer {
    async fn next_delivery(&mut self) -> Result<Option<JobDelivery>> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(StoreError::Amqp(e)),
            Some(Ok(delivery)) => {
                let job = serde_json::from_slice::<AnalysisJob>(&delivery.data).ok();
                Ok(Some(JobDelivery::new(job, Box::new(LapinDeliveryHandle(delivery)))))
            }
        }
    }
}

async fn dial_with_backoff(url: &str) -> Result<Link> {
    let mut last_err = None;
    for delay_secs in RECONNECT_BACKOFF_SECS {
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        match dial_once(url).await {
            Ok(link) => return Ok(link),
            Err(e) => last_err = Some(e),
        }
    }
    tracing::error!(attempts = RECONNECT_BACKOFF_SECS.len(), error = ?last_err, "rabbitmq reconnect exhausted");
    Err(StoreError::ReconnectExhausted { attempts: RECONNECT_BACKOFF_SECS.len() as u32 })
}

async fn dial_once(url: &str) -> Result<Link> {
    let connection = Connection::connect(url, ConnectionProperties::default())
        .await
        .map_err(StoreError::Amqp)?;
    let channel = connection.create_channel().await.map_err(StoreError::Amqp)?;
    channel
        .exchange_declare(
            EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await
        .map_err(StoreError::Amqp)?;
    channel
        .queue_declare(
            QUEUE,
            QueueDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await
        .map_err(StoreError::Amqp)?;
    channel
        .queue_bind(QUEUE, EXCHANGE, ROUTING_KEY, QueueBindOptions::default(), FieldTable::default())
        .await
        .map_err(StoreError::Amqp)?;
    Ok(Link { _connection: connection, channel })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_job_round_trips_through_json() {
        let job = AnalysisJob { session_id: "abc".into(), start: 1_700_000_000, end: 1_700_000_100 };
        let raw = serde_json::to_string(&job).expect("serialize");
        let back: AnalysisJob = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(job, back);
    }

    #[test]
    fn backoff_schedule_matches_spec() {
        assert_eq!(RECONNECT_BACKOFF_SECS, [1, 2, 4, 8, 16, 32]);
    }
}
