//! Errors for the dialog engine, voice engine, and analysis worker.

/// Errors that can occur while orchestrating a live session or draining an analysis job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The client socket closed or errored.
    #[error("client socket error: {0}")]
    Socket(String),

    /// The session-open frame was not received before the open-frame deadline elapsed.
    #[error("timed out waiting for the session-open frame")]
    OpenFrameTimeout,

    /// The session-open frame named an unsupported language tag.
    #[error("unsupported language tag: {0}")]
    UnsupportedLanguage(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A provider adapter call failed.
    #[error("provider error: {0}")]
    Provider(#[from] dialog_providers::ProviderError),

    /// A persistence call (transcript store, job queue, report archive) failed.
    #[error("store error: {0}")]
    Store(#[from] dialog_store::StoreError),

    /// An analysis job payload did not match the expected shape.
    #[error("malformed analysis job: {0}")]
    MalformedJob(String),

    /// A client frame did not match the shape its position in the protocol requires.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
