//! External persistence for the dialog engine: the append-only transcript store (Redis), the
//! durable analysis job queue (RabbitMQ), and the paged report archive (MongoDB).
//!
//! None of these types talk to each other; `dialog-engine` holds one of each behind the
//! capability traits exported here so engine logic can be unit-tested against in-memory fakes.

mod archive;
mod config;
mod error;
mod queue;
mod transcript;

pub use archive::{MongoReportArchive, ReportArchive, TranscriptBundle};
pub use config::{MongoConfig, RabbitMqConfig, RedisConfig};
pub use error::{Result, StoreError};
pub use queue::{
    AnalysisJob, JobConsumer, JobDelivery, JobDeliveryHandle, JobPublisher, LapinJobConsumer,
    LapinJobQueue, RECONNECT_BACKOFF_SECS,
};
pub use transcript::{ChatHistoryEntry, RedisTranscriptStore, TranscriptStore};
