//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame body is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Frame is JSON but matches neither a response nor a notification.
    #[error("unexpected frame shape: {0}")]
    UnexpectedShape(String),

    /// Failed to serialize an outgoing payload.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Too many bytes buffered without seeing a terminator.
    #[error("frame too large: {size} bytes buffered without terminator (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Creates an unexpected shape error.
    pub fn unexpected_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedShape(message.into())
    }

    /// Returns true if the decoder state is unusable after this error.
    ///
    /// A bad frame body is consumed by the decoder and the stream can
    /// continue; an oversized buffer cannot be resynchronised.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}
