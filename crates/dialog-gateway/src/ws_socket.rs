//! Adapts an `axum` websocket to the [`ClientSocketReader`]/[`ClientSocketWriter`] traits
//! `dialog-engine` is generic over, by splitting it into independent sink and stream halves
//! the same way the provider adapters split their own websockets.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use dialog_engine::{ClientMessage, ClientSocketReader, ClientSocketWriter, EngineError, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// Read half of an upgraded client websocket.
pub struct AxumSocketReader {
    inner: SplitStream<WebSocket>,
}

impl AxumSocketReader {
    #[must_use]
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ClientSocketReader for AxumSocketReader {
    async fn recv(&mut self) -> Option<Result<ClientMessage>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(EngineError::Socket(err.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(ClientMessage::Text(text.to_string()))),
                Message::Binary(data) => return Some(Ok(ClientMessage::Binary(data))),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }
}

/// Write half of an upgraded client websocket.
pub struct AxumSocketWriter {
    inner: SplitSink<WebSocket, Message>,
}

impl AxumSocketWriter {
    #[must_use]
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ClientSocketWriter for AxumSocketWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| EngineError::Socket(err.to_string()))
    }

    async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.inner
            .send(Message::Binary(data))
            .await
            .map_err(|err| EngineError::Socket(err.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.inner.close().await;
        Ok(())
    }
}
