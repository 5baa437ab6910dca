//! Live status updates.
//!
//! Each update is merged into the state seen so far, so partial pushes
//! still render the full line. When the subscription dies the whole
//! handshake runs again. A subscription that ends before delivering any
//! snapshot counts as a failed attempt; after `max_attempts` of those in a
//! row the command fails with `HandshakeFailed`.

use tracing::{error, info, warn};

use klipperstat_core::{StatusFormatter, StatusSnapshot};
use klipperstat_protocol::StatusQuery;

use crate::error::{ClientError, ClientResult};
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownHandle;

pub async fn run(
    orchestrator: &Orchestrator,
    query: &StatusQuery,
    formatter: &StatusFormatter,
    shutdown: &ShutdownHandle,
) -> ClientResult<()> {
    let max_attempts = orchestrator.retry_policy().max_attempts.max(1);
    let mut failures = 0;

    loop {
        let mut subscription = match orchestrator.subscribe(query).await {
            Ok(subscription) => subscription,
            Err(ClientError::Cancelled) => return stopped(shutdown),
            Err(e) => return Err(e),
        };
        info!("Subscribed");

        let mut current: Option<StatusSnapshot> = None;
        let mut ended = ClientError::SessionClosed;
        while let Some(item) = subscription.next().await {
            match item {
                Ok(update) => {
                    match current.as_mut() {
                        Some(state) => state.merge(&update),
                        None => current = Some(update),
                    }
                    if let Some(ref state) = current {
                        println!("{}", formatter.format(state));
                    }
                }
                Err(ClientError::Cancelled) => return stopped(shutdown),
                Err(e) => ended = e,
            }
        }

        if current.is_some() {
            failures = 0;
        }
        failures += 1;

        if !ended.is_retryable() {
            return Err(ended);
        }
        if failures >= max_attempts {
            error!(attempts = failures, error = %ended, "Giving up");
            return Err(ClientError::HandshakeFailed {
                attempts: failures,
                last: Box::new(ended),
            });
        }
        warn!(
            attempt = failures,
            max_attempts,
            error = %ended,
            "Subscription ended, reconnecting"
        );

        if shutdown.is_shutdown() {
            return stopped(shutdown);
        }
        match orchestrator.pause().await {
            Err(ClientError::Cancelled) => return stopped(shutdown),
            other => other?,
        }
    }
}

fn stopped(shutdown: &ShutdownHandle) -> ClientResult<()> {
    if let Some(reason) = shutdown.reason() {
        info!(%reason, "Watch stopped");
    }
    Ok(())
}
