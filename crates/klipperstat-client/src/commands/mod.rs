//! Subcommand implementations.

pub mod config;
pub mod discover;
pub mod objects;
pub mod status;
pub mod watch;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownHandle;

/// Builds the orchestrator for the connecting commands.
pub fn orchestrator(config: &ClientConfig, shutdown: ShutdownHandle) -> ClientResult<Orchestrator> {
    config.validate()?;
    Ok(Orchestrator::new(config.resolver())
        .with_session_options(config.session_options()?)
        .with_retry_policy(config.retry_policy()?)
        .with_api_key(config.connection.api_key.clone())
        .with_idle_timeout(config.idle_timeout()?)
        .with_shutdown(shutdown))
}
