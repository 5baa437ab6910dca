//! Resolved connection target for the Klipper API socket.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Socket path and optional credential used to reach Klipper.
///
/// Produced by the endpoint resolver and read-only afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Filesystem path of the Unix domain socket.
    pub socket_path: PathBuf,
    /// API key to embed in requests, if the printer config defines one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint without an API key.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            api_key: None,
        }
    }

    /// Builder: set the API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

// The key never ends up in log lines.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("socket_path", &self.socket_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let endpoint = Endpoint::new("/tmp/klippy.sock").with_api_key(Some("hunter2".into()));
        let debug = format!("{:?}", endpoint);
        assert!(debug.contains("/tmp/klippy.sock"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn display_is_socket_path() {
        let endpoint = Endpoint::new("/run/klipper/api.sock");
        assert_eq!(endpoint.to_string(), "/run/klipper/api.sock");
        assert_eq!(endpoint.socket_path(), Path::new("/run/klipper/api.sock"));
    }
}
