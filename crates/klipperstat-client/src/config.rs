//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/klipperstat/config.toml` by default. Every section is
//! optional; a missing file yields the defaults below.
//!
//! ```toml
//! debug = false
//! output = "tty"
//!
//! [connection]
//! socket_path = "/home/pi/printer_data/comms/klippy.sock"
//! connect_attempts = 3
//! attempt_delay_secs = 2.0
//! read_timeout_secs = 10.0
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 2.0
//!
//! [subscription]
//! idle_timeout_secs = 10.0
//!
//! [subscription.objects]
//! toolhead = ["position"]
//! print_stats = ["state", "filename"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use klipperstat_core::{Endpoint, OutputFormat};
use klipperstat_discovery::{EndpointResolver, StaticResolver, SystemResolver};
use klipperstat_protocol::{DEFAULT_MAX_FRAME_SIZE, StatusQuery};

use crate::error::{ClientError, ClientResult};
use crate::orchestrator::RetryPolicy;
use crate::session::SessionOptions;

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the klipperstat client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Output format for status lines.
    pub output: OutputFormat,

    /// Socket connection settings.
    pub connection: ConnectionSettings,

    /// Whole-sequence retry settings.
    pub retry: RetrySettings,

    /// Subscription settings.
    pub subscription: SubscriptionSettings,

    /// Endpoint discovery settings.
    pub discovery: DiscoverySettings,
}

/// Socket connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Fixed socket path; skips discovery when set.
    pub socket_path: Option<PathBuf>,

    /// API key sent with every request; overrides a discovered key.
    pub api_key: Option<String>,

    /// Connect attempts per endpoint.
    pub connect_attempts: u32,

    /// Seconds between connect attempts.
    pub attempt_delay_secs: f64,

    /// Seconds to wait for a reply frame.
    pub read_timeout_secs: f64,

    /// Bytes buffered without a terminator before the stream is rejected.
    pub max_frame_bytes: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            api_key: None,
            connect_attempts: 3,
            attempt_delay_secs: 2.0,
            read_timeout_secs: 10.0,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("socket_path", &self.socket_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_attempts", &self.connect_attempts)
            .field("attempt_delay_secs", &self.attempt_delay_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

/// Whole-sequence retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Full connection sequences before giving up.
    pub max_attempts: u32,

    /// Seconds between sequences.
    pub delay_secs: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 2.0,
        }
    }
}

/// Subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSettings {
    /// Seconds without any frame before the subscription is considered
    /// dead. `0` disables the check.
    pub idle_timeout_secs: f64,

    /// Objects and fields to query or subscribe to. An empty field list
    /// selects every field of the object.
    pub objects: BTreeMap<String, Vec<String>>,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        let objects = BTreeMap::from([
            ("toolhead".to_string(), vec!["position".to_string()]),
            (
                "print_stats".to_string(),
                vec!["state".to_string(), "filename".to_string()],
            ),
        ]);
        Self {
            idle_timeout_secs: 10.0,
            objects,
        }
    }
}

/// Endpoint discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Procfs root to scan for running services.
    pub proc_root: PathBuf,

    /// Directory checked for a `klippy.sock` fallback.
    pub socket_dir: PathBuf,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            socket_dir: PathBuf::from("/tmp"),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("klipperstat")
    }

    /// Checks value ranges.
    pub fn validate(&self) -> ClientResult<()> {
        if self.connection.connect_attempts == 0 {
            return Err(ClientError::config("connection.connect_attempts must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::config("retry.max_attempts must be at least 1"));
        }
        if self.connection.max_frame_bytes == 0 {
            return Err(ClientError::config("connection.max_frame_bytes must be positive"));
        }
        if self.subscription.objects.is_empty() {
            return Err(ClientError::config("subscription.objects must not be empty"));
        }
        seconds("connection.attempt_delay_secs", self.connection.attempt_delay_secs)?;
        positive_seconds("connection.read_timeout_secs", self.connection.read_timeout_secs)?;
        seconds("retry.delay_secs", self.retry.delay_secs)?;
        seconds("subscription.idle_timeout_secs", self.subscription.idle_timeout_secs)?;
        Ok(())
    }

    /// Builds the session parameters.
    pub fn session_options(&self) -> ClientResult<SessionOptions> {
        Ok(SessionOptions::default()
            .with_connect_attempts(self.connection.connect_attempts)
            .with_attempt_delay(seconds(
                "connection.attempt_delay_secs",
                self.connection.attempt_delay_secs,
            )?)
            .with_read_timeout(Some(positive_seconds(
                "connection.read_timeout_secs",
                self.connection.read_timeout_secs,
            )?))
            .with_max_frame_size(self.connection.max_frame_bytes))
    }

    /// Builds the whole-sequence retry policy.
    pub fn retry_policy(&self) -> ClientResult<RetryPolicy> {
        Ok(RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: seconds("retry.delay_secs", self.retry.delay_secs)?,
        })
    }

    /// Returns the subscription idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> ClientResult<Option<Duration>> {
        let idle = seconds(
            "subscription.idle_timeout_secs",
            self.subscription.idle_timeout_secs,
        )?;
        Ok((!idle.is_zero()).then_some(idle))
    }

    /// Builds the object selection for query and subscribe.
    pub fn status_query(&self) -> StatusQuery {
        self.subscription
            .objects
            .iter()
            .fold(StatusQuery::new(), |query, (name, fields)| {
                if fields.is_empty() {
                    query.all_fields(name.clone())
                } else {
                    query.object(name.clone(), fields.iter().cloned())
                }
            })
    }

    /// Builds the endpoint resolver: fixed when a socket path is set,
    /// otherwise a system scan.
    pub fn resolver(&self) -> Arc<dyn EndpointResolver> {
        match self.connection.socket_path {
            Some(ref path) => Arc::new(StaticResolver::new(
                Endpoint::new(path.clone()).with_api_key(self.connection.api_key.clone()),
            )),
            None => Arc::new(self.system_resolver()),
        }
    }

    /// Builds a system resolver from the discovery settings.
    pub fn system_resolver(&self) -> SystemResolver {
        SystemResolver::new()
            .with_proc_root(self.discovery.proc_root.clone())
            .with_socket_dir(self.discovery.socket_dir.clone())
    }
}

fn seconds(field: &str, value: f64) -> ClientResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ClientError::config(format!("{field} must be a non-negative number of seconds")))
}

fn positive_seconds(field: &str, value: f64) -> ClientResult<Duration> {
    let duration = seconds(field, value)?;
    if duration.is_zero() {
        return Err(ClientError::config(format!("{field} must be greater than zero")));
    }
    Ok(duration)
}
