//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use klipperstat_core::OutputFormat;

use crate::config::ClientConfig;

/// klipperstat - Klipper toolhead position and print state from the API socket
#[derive(Debug, Parser)]
#[command(name = "klipperstat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "KLIPPERSTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    // --- Connection flags ---
    /// Path to the Klipper API socket (skips discovery)
    #[arg(long = "socket", env = "KLIPPERSTAT_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// API key to send with every request
    #[arg(long, env = "KLIPPERSTAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Connect attempts per endpoint
    #[arg(long)]
    pub connect_attempts: Option<u32>,

    /// Seconds between connect attempts
    #[arg(long)]
    pub attempt_delay: Option<f64>,

    /// Seconds to wait for a reply
    #[arg(long)]
    pub read_timeout: Option<f64>,

    // --- Retry flags ---
    /// Full connection sequences before giving up
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds between connection sequences
    #[arg(long)]
    pub retry_delay: Option<f64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Returns the output format based on CLI flags and config.
    pub fn output_format(&self, config: &ClientConfig) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            config.output
        }
    }

    /// Overrides config values with the flags that were given.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        config.debug |= self.debug;
        if self.json {
            config.output = OutputFormat::Json;
        }
        if let Some(ref path) = self.socket_path {
            config.connection.socket_path = Some(path.clone());
        }
        if let Some(ref key) = self.api_key {
            config.connection.api_key = Some(key.clone());
        }
        if let Some(attempts) = self.connect_attempts {
            config.connection.connect_attempts = attempts;
        }
        if let Some(delay) = self.attempt_delay {
            config.connection.attempt_delay_secs = delay;
        }
        if let Some(timeout) = self.read_timeout {
            config.connection.read_timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry.delay_secs = delay;
        }
    }
}

/// Available commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Query toolhead position and print state once (default)
    Status,

    /// Subscribe and print every status update until interrupted
    Watch,

    /// List the status objects the printer exposes
    Objects,

    /// Show discovered services, config files and the resolved socket
    Discover,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
