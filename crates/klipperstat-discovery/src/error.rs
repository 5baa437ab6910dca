//! Error types for endpoint discovery.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur while resolving the Klipper endpoint.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Reading a directory or file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No process, config file or well-known path named a socket.
    #[error("could not find the Klipper Unix domain socket path")]
    SocketNotFound,

    /// The socket path does not fit in `sockaddr_un.sun_path`.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    SocketPathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl DiscoveryError {
    /// Creates an IO error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
