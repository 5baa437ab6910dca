//! Client error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use klipperstat_discovery::DiscoveryError;
use klipperstat_protocol::{ErrorPayload, ProtocolError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
///
/// Transport errors never leave the session as raw [`io::Error`]s; each one
/// is wrapped in the variant describing what failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A single connect attempt failed (refused, missing path, timeout).
    #[error("connection to {path} failed: {source}")]
    ConnectionRefused {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every connect attempt for the current endpoint failed.
    #[error("could not connect to {path} after {attempts} attempts")]
    ConnectionExhausted { path: PathBuf, attempts: u32 },

    /// No frame arrived before the read deadline.
    #[error("timed out after {0:.1}s waiting for a frame")]
    ReadTimeout(f64),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    PeerClosed,

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] ProtocolError),

    /// Writing to the socket failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// The peer answered a request with an `error` member.
    #[error("{method} failed: {error}")]
    RpcError { method: String, error: ErrorPayload },

    /// All orchestration attempts failed; carries the last cause.
    #[error("handshake failed after {attempts} attempts: {last}")]
    HandshakeFailed {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    /// Operation on a session that is closed or failed.
    #[error("session is no longer usable")]
    SessionClosed,

    /// A reply did not have the expected shape.
    #[error("unexpected response to {method}: {message}")]
    UnexpectedResponse { method: String, message: String },

    /// Endpoint resolution failed.
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Shutdown requested while an operation was pending.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an unexpected response error.
    pub fn unexpected_response(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns true if re-running the whole connection sequence may help.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Cancelled | Self::HandshakeFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retryable_classification() {
        assert!(ClientError::PeerClosed.is_retryable());
        assert!(ClientError::ReadTimeout(10.0).is_retryable());
        assert!(
            ClientError::ConnectionExhausted {
                path: "/tmp/klippy.sock".into(),
                attempts: 3
            }
            .is_retryable()
        );
        assert!(
            ClientError::RpcError {
                method: "objects/list".into(),
                error: ErrorPayload(json!({"message": "x"})),
            }
            .is_retryable()
        );
        assert!(ClientError::Discovery(DiscoveryError::SocketNotFound).is_retryable());

        assert!(!ClientError::Cancelled.is_retryable());
        assert!(!ClientError::config("bad").is_retryable());
        assert!(
            !ClientError::HandshakeFailed {
                attempts: 3,
                last: Box::new(ClientError::PeerClosed)
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_messages() {
        let err = ClientError::RpcError {
            method: "printer.objects.query".into(),
            error: ErrorPayload(json!({"message": "Unknown command"})),
        };
        assert_eq!(err.to_string(), "printer.objects.query failed: Unknown command");

        let err = ClientError::HandshakeFailed {
            attempts: 3,
            last: Box::new(ClientError::PeerClosed),
        };
        assert_eq!(
            err.to_string(),
            "handshake failed after 3 attempts: connection closed by peer"
        );
        assert_eq!(ClientError::ReadTimeout(10.0).to_string(), "timed out after 10.0s waiting for a frame");
    }
}
