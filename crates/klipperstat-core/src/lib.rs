//! Core types: endpoints, status snapshots, rendering, tracing

pub mod endpoint;
pub mod format;
pub mod status;
pub mod tracing;

pub use endpoint::Endpoint;
pub use format::{OutputFormat, StatusFormatter};
pub use status::{Position, StatusSnapshot};
pub use tracing::{TracingConfig, TracingError, TracingGuard, TracingOutputFormat, init_tracing};
