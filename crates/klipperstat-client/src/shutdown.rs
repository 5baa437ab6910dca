//! Interrupt handling for `watch` and retry pauses.
//!
//! A termination signal records a [`ShutdownReason`] in a shared watch
//! channel. The orchestrator and subscription race their suspension points
//! against [`ShutdownHandle::wait`] and release the socket when it fires.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Why the run is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Triggered from code.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "interrupted",
            Self::Terminate => "terminated",
            Self::Requested => "shutdown requested",
        })
    }
}

/// Shared stop flag. Clones observe the same state.
#[derive(Clone)]
pub struct ShutdownHandle {
    state: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("reason", &self.reason())
            .finish()
    }
}

impl ShutdownHandle {
    fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Requests a stop. The first reason recorded wins.
    pub fn trigger(&self) {
        self.stop(ShutdownReason::Requested);
    }

    fn stop(&self, reason: ShutdownReason) {
        self.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.state.borrow()
    }

    /// Completes once a stop has been requested.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(Option::is_some).await;
    }
}

/// Owns the signal listener for one run.
#[derive(Debug)]
pub struct SignalHandler {
    handle: ShutdownHandle,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            handle: ShutdownHandle::new(),
        }
    }

    /// Installs SIGINT and SIGTERM handlers and spawns the listener task.
    ///
    /// # Errors
    ///
    /// Fails if a handler cannot be installed. Must run inside a tokio
    /// runtime.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let handle = self.handle.clone();

        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = interrupt.recv() => ShutdownReason::Interrupt,
                _ = terminate.recv() => ShutdownReason::Terminate,
            };
            info!(%reason, "Stopping");
            handle.stop(reason);
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> io::Result<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(reason = %ShutdownReason::Interrupt, "Stopping");
                handle.stop(ShutdownReason::Interrupt);
            }
        });
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.handle.is_shutdown()
    }

    pub fn trigger_shutdown(&self) {
        self.handle.trigger();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn handles_share_state() {
        let handler = SignalHandler::new();
        let handle = handler.shutdown_handle();
        assert!(!handle.is_shutdown());
        assert_eq!(handle.reason(), None);

        handle.trigger();
        assert!(handler.is_shutdown());
        assert_eq!(
            handler.shutdown_handle().reason(),
            Some(ShutdownReason::Requested)
        );
    }

    #[test]
    fn first_reason_wins() {
        let handle = SignalHandler::new().shutdown_handle();
        handle.stop(ShutdownReason::Terminate);
        handle.trigger();
        assert_eq!(handle.reason(), Some(ShutdownReason::Terminate));
        assert_eq!(ShutdownReason::Terminate.to_string(), "terminated");
    }

    #[tokio::test]
    async fn wait_wakes_on_trigger() {
        let handler = SignalHandler::new();
        let waiter = handler.shutdown_handle();
        let task = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        handler.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_is_immediate_after_trigger() {
        let handler = SignalHandler::new();
        handler.trigger_shutdown();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), handler.shutdown_handle().wait()).await;
        assert!(waited.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_installs() {
        let handler = SignalHandler::new();
        handler.spawn_listener().unwrap();
        assert!(!handler.is_shutdown());
    }
}
