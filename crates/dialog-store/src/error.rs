//! Errors for the transcript store, job queue, and report archive.

/// Errors that can occur while talking to Redis, RabbitMQ, or MongoDB.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis transport or command error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// RabbitMQ transport or protocol error.
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// MongoDB transport or command error.
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// BSON serialization error.
    #[error("bson serialize error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The RabbitMQ reconnect loop exhausted its retry budget.
    #[error("rabbitmq reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of consecutive failed attempts before giving up.
        attempts: u32,
    },

    /// A stored entry did not match the expected shape.
    #[error("malformed stored entry: {0}")]
    Malformed(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
