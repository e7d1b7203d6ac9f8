//! The capability the engine depends on for the client socket, rather than a concrete
//! websocket type — `dialog-gateway` adapts an `axum` websocket split into these traits;
//! tests adapt an in-memory channel pair.
//!
//! Reads and writes are split into separate traits because only the input task ever reads,
//! while every task that can produce a frame (token stream, tts-down, keepalive reply) needs
//! to write; the writer is therefore held behind a shared mutex and the reader is not.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One message read from the client socket.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// A text frame, expected to be JSON.
    Text(String),
    /// A binary frame (audio on `/voice/asr`, or the keepalive-ack shape on `/chat/`).
    Binary(Bytes),
}

/// Read half of the client socket. Exactly one task reads per session.
#[async_trait]
pub trait ClientSocketReader: Send {
    /// Read the next message, or `None` once the peer closes the connection cleanly.
    async fn recv(&mut self) -> Option<Result<ClientMessage>>;
}

/// Write half of the client socket. Shared across tasks behind a mutex so writes never
/// interleave mid-frame.
#[async_trait]
pub trait ClientSocketWriter: Send {
    /// Write a pre-serialized JSON text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;
    /// Write a binary frame.
    async fn send_binary(&mut self, data: Bytes) -> Result<()>;
    /// Close the underlying connection. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Serialize `value` to JSON and write it as a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails or the underlying write fails.
pub async fn send_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: ClientSocketWriter + ?Sized,
    T: serde::Serialize + ?Sized,
{
    let text = serde_json::to_string(value)?;
    writer.send_text(text).await
}
