//! Log output for the klipperstat crates.
//!
//! Everything goes to stderr; stdout is reserved for rendered status lines.
//! [`init_tracing`] installs a scoped default subscriber and hands back a
//! [`TracingGuard`]. The subscriber lives exactly as long as the guard.
//!
//! ```ignore
//! let _guard = klipperstat_core::init_tracing(TracingConfig::cli_debug())?;
//! ```

use thiserror::Error;
use tracing::subscriber::DefaultGuard;
use tracing::{Level, Subscriber};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Log targets covered by the default filter.
const TARGETS: [&str; 5] = [
    "klipperstat",
    "klipperstat_core",
    "klipperstat_protocol",
    "klipperstat_discovery",
    "klipperstat_client",
];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line layout for log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, indented.
    Pretty,
    #[default]
    Compact,
    /// One JSON object per record.
    Json,
}

/// What to log and how.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for klipperstat targets when no filter is given and `RUST_LOG`
    /// is unset.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Source file and line of each record.
    pub show_location: bool,
    pub show_target: bool,
    pub show_timestamp: bool,
    /// Explicit filter directive; wins over `RUST_LOG` and `level`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    /// Warnings only: retries and their causes, and the final give-up.
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: TracingOutputFormat::Compact,
            show_location: false,
            show_target: false,
            show_timestamp: true,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// `--debug`: connect attempts and frame traffic, with their origin.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            show_location: true,
            show_target: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directive applied when neither `filter` nor `RUST_LOG` is set.
    fn default_directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match self.filter {
            Some(ref directive) => Ok(EnvFilter::try_new(directive)?),
            None => match EnvFilter::try_from_default_env() {
                Ok(filter) => Ok(filter),
                Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
            },
        }
    }

    fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(self.show_location)
            .with_line_number(self.show_location)
            .with_target(self.show_target);

        match (self.format, self.show_timestamp) {
            (TracingOutputFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
            (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => layer.json().boxed(),
            (TracingOutputFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Uninstalls the subscriber when dropped.
#[must_use = "dropping the guard immediately uninstalls the subscriber"]
pub struct TracingGuard {
    _default: DefaultGuard,
}

impl std::fmt::Debug for TracingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingGuard").finish_non_exhaustive()
    }
}

/// Installs the subscriber described by `config` for the current thread.
///
/// Async code must run on a current-thread runtime for every task to see
/// it.
///
/// # Errors
///
/// Returns [`TracingError::EnvFilter`] if a filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard, TracingError> {
    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(config.fmt_layer());
    Ok(TracingGuard {
        _default: tracing::subscriber::set_default(subscriber),
    })
}
