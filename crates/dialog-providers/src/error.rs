//! Errors for the provider adapters.

/// Errors that can occur while talking to a Chat-LLM, TTS, ASR, or Report-LLM provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Underlying frame codec error.
    #[error("frame codec error: {0}")]
    Codec(#[from] dialog_protocol::CodecError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider returned a non-2xx HTTP status.
    #[error("provider returned status {status}: {body_preview}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First bytes of the response body, for diagnostics.
        body_preview: String,
    },

    /// A protocol handshake did not receive the event it was waiting for.
    #[error("expected event {expected} was not received")]
    EventNotReceived {
        /// The event tag that was expected.
        expected: i32,
    },

    /// Malformed or unexpected frame/response shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying stream ended before the caller closed it.
    #[error("stream closed early: {0}")]
    StreamClosed(String),

    /// Configuration is missing a required credential or URL.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
