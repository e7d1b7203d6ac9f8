//! Capability traits that `dialog-engine` depends on instead of the concrete adapter types,
//! so engine logic can be exercised against in-crate fakes with no network access.

use async_trait::async_trait;
use bytes::Bytes;

use crate::asr_bidi::AsrResult;
use crate::chat::ChatToken;
use crate::error::Result;

/// One streamed Chat-LLM turn, yielding incremental tokens. Owned by a single task.
#[async_trait]
pub trait ChatCursor: Send {
    /// Read the next token, or `None` at end-of-stream.
    async fn next_token(&mut self) -> Option<Result<ChatToken>>;
    /// Close the underlying event source early.
    fn close(&mut self);
}

#[async_trait]
impl ChatCursor for crate::chat::ChatCursor {
    async fn next_token(&mut self) -> Option<Result<ChatToken>> {
        self.next().await
    }

    fn close(&mut self) {
        crate::chat::ChatCursor::close(self);
    }
}

/// Chat-LLM capability: open a streamed completion call.
#[async_trait]
pub trait ChatLlmProvider: Send + Sync {
    /// Begin a streamed call; see [`crate::chat::ChatLlm::stream_call`].
    fn stream_call(&self, prompt: &str, session_id: &str) -> Result<Box<dyn ChatCursor>>;
}

impl ChatLlmProvider for crate::chat::ChatLlm {
    fn stream_call(&self, prompt: &str, session_id: &str) -> Result<Box<dyn ChatCursor>> {
        let cursor = crate::chat::ChatLlm::stream_call(self, prompt, session_id)?;
        Ok(Box::new(cursor))
    }
}

/// Report-LLM capability: a single non-streaming completion call.
#[async_trait]
pub trait ReportLlmProvider: Send + Sync {
    /// Call the reporting model with `prompt`; see [`crate::report::ReportLlm::call`].
    async fn call(&self, prompt: &str) -> Result<serde_json::Value>;
}

#[async_trait]
impl ReportLlmProvider for crate::report::ReportLlm {
    async fn call(&self, prompt: &str) -> Result<serde_json::Value> {
        crate::report::ReportLlm::call(self, prompt).await
    }
}

/// One open TTS session, streaming (bidi) or per-utterance (unary) alike. The engine holds
/// exactly one of these per dialog session, shared between the `tts-up` sender task and the
/// `tts-down` receiver task, so every method takes `&self`: each concrete adapter serializes
/// its own socket access internally rather than requiring the caller to hold `&mut`.
#[async_trait]
pub trait TtsSession: Send + Sync {
    /// Perform any connection/session handshake required before the first `send_text`.
    async fn start(&self) -> Result<()>;
    /// Submit one utterance of text for synthesis.
    async fn send_text(&self, text: &str) -> Result<()>;
    /// Receive the next audio chunk, or `None` once the current utterance is finished.
    async fn receive_audio(&self) -> Result<Option<Bytes>>;
    /// Close the session. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl TtsSession for crate::tts_bidi::TtsBidiSession {
    async fn start(&self) -> Result<()> {
        crate::tts_bidi::TtsBidiSession::start(self).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        crate::tts_bidi::TtsBidiSession::send_text(self, text).await
    }

    async fn receive_audio(&self) -> Result<Option<Bytes>> {
        crate::tts_bidi::TtsBidiSession::receive_audio(self).await
    }

    async fn close(&self) -> Result<()> {
        crate::tts_bidi::TtsBidiSession::close(self).await
    }
}

#[async_trait]
impl TtsSession for crate::tts_unary::TtsUnarySession {
    async fn start(&self) -> Result<()> {
        crate::tts_unary::TtsUnarySession::start(self).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        crate::tts_unary::TtsUnarySession::send_text(self, text).await
    }

    async fn receive_audio(&self) -> Result<Option<Bytes>> {
        crate::tts_unary::TtsUnarySession::receive_audio(self).await
    }

    async fn close(&self) -> Result<()> {
        crate::tts_unary::TtsUnarySession::close(self).await
    }
}

/// TTS capability: dial a fresh session, bidirectional or unary.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Open the websocket and return a fresh, unstarted session.
    async fn dial(&self) -> Result<Box<dyn TtsSession>>;
}

#[async_trait]
impl TtsProvider for crate::tts_bidi::TtsBidi {
    async fn dial(&self) -> Result<Box<dyn TtsSession>> {
        let session = crate::tts_bidi::TtsBidi::dial(self).await?;
        Ok(Box::new(session))
    }
}

#[async_trait]
impl TtsProvider for crate::tts_unary::TtsUnary {
    async fn dial(&self) -> Result<Box<dyn TtsSession>> {
        let session = crate::tts_unary::TtsUnary::dial(self).await?;
        Ok(Box::new(session))
    }
}

/// One open bidirectional ASR session, shared between the `listen` sender task and the
/// `recognise` receiver task.
#[async_trait]
pub trait AsrBidiSession: Send + Sync {
    /// Stream one chunk of raw PCM audio to the recognizer.
    async fn send_audio(&self, data: &[u8]) -> Result<()>;
    /// Send the terminal (negative-sequence) frame that flushes recognition of the current
    /// utterance; triggered by the client's one-byte `0xFF` end-of-speech sentinel.
    async fn last(&self) -> Result<()>;
    /// Receive the next transcript fragment, or `None` at the provider's terminal frame.
    async fn recv_result(&self) -> Result<Option<AsrResult>>;
    /// Close the underlying websocket. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl AsrBidiSession for crate::asr_bidi::AsrSession {
    async fn send_audio(&self, data: &[u8]) -> Result<()> {
        crate::asr_bidi::AsrSession::send_audio(self, data).await
    }

    async fn last(&self) -> Result<()> {
        crate::asr_bidi::AsrSession::last(self).await
    }

    async fn recv_result(&self) -> Result<Option<AsrResult>> {
        crate::asr_bidi::AsrSession::recv_result(self).await
    }

    async fn close(&self) -> Result<()> {
        crate::asr_bidi::AsrSession::close(self).await
    }
}

/// ASR-bidi capability: dial an already-handshaken session.
#[async_trait]
pub trait AsrBidiProvider: Send + Sync {
    /// Open the websocket and send the recognition configuration handshake.
    async fn dial(&self) -> Result<Box<dyn AsrBidiSession>>;
}

#[async_trait]
impl AsrBidiProvider for crate::asr_bidi::AsrBidi {
    async fn dial(&self) -> Result<Box<dyn AsrBidiSession>> {
        let session = crate::asr_bidi::AsrBidi::dial(self).await?;
        Ok(Box::new(session))
    }
}
