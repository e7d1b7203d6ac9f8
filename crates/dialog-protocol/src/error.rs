//! Errors produced while packing or parsing wire frames.

/// Errors from the binary frame codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame was shorter than the header or a declared field required.
    #[error("truncated frame: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum number of bytes required to continue parsing.
        expected: usize,
        /// Number of bytes actually available.
        actual: usize,
    },

    /// Byte 1's high nibble did not match any known message-type tag.
    #[error("unknown message type tag: {0:#x}")]
    UnknownMessageType(u8),

    /// The provider returned a server-error frame.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the first four payload bytes.
        code: u32,
        /// UTF-8 error message following the code.
        message: String,
    },

    /// Gzip compression or decompression failed.
    #[error("gzip error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON payload serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
