//! Top-level connection sequence with whole-sequence retries.
//!
//! One attempt is: resolve endpoint, connect (with its own bounded connect
//! retries), `objects/list`, then the caller's operation. Any retryable
//! failure drops the session, waits `delay`, and starts over from endpoint
//! resolution. After `max_attempts` the last failure is wrapped in
//! [`ClientError::HandshakeFailed`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, error, info_span, warn};

use klipperstat_core::StatusSnapshot;
use klipperstat_discovery::{EndpointResolver, ResolvedEndpoint};
use klipperstat_protocol::StatusQuery;

use crate::error::{ClientError, ClientResult};
use crate::rpc::RpcClient;
use crate::session::{Session, SessionOptions};
use crate::shutdown::ShutdownHandle;
use crate::subscription::Subscription;

/// Bounds for whole-sequence retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// A connected, responsive session after a successful `objects/list`.
#[derive(Debug)]
pub struct Handshake {
    pub session: Session,
    pub rpc: RpcClient,
    pub resolved: ResolvedEndpoint,
    /// Objects reported by `objects/list`.
    pub objects: Vec<String>,
    /// Which attempt succeeded, starting at 1.
    pub attempt: u32,
    /// Time from the start of the first attempt to the end of the handshake.
    pub elapsed: Duration,
}

/// Outcome of a one-shot status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub objects: Vec<String>,
    pub elapsed: Duration,
    pub snapshot: StatusSnapshot,
}

/// Drives the connection sequence against an [`EndpointResolver`].
pub struct Orchestrator {
    resolver: Arc<dyn EndpointResolver>,
    session_options: SessionOptions,
    retry: RetryPolicy,
    api_key: Option<String>,
    idle_timeout: Option<Duration>,
    shutdown: Option<ShutdownHandle>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session_options", &self.session_options)
            .field("retry", &self.retry)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(resolver: Arc<dyn EndpointResolver>) -> Self {
        Self {
            resolver,
            session_options: SessionOptions::default(),
            retry: RetryPolicy::default(),
            api_key: None,
            idle_timeout: SessionOptions::default().read_timeout,
            shutdown: None,
        }
    }

    /// Builder: set connect and read parameters.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Builder: set the whole-sequence retry bounds.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: use this API key instead of the resolved one.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Builder: idle timeout for subscriptions. `None` disables it.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Builder: abort retries and subscriptions on shutdown.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Connects and lists objects, with retries.
    pub async fn handshake(&self) -> ClientResult<Handshake> {
        self.run(|handshake| async move { Ok(handshake) }).await
    }

    /// Handshakes, then queries `query` once.
    pub async fn query_status(&self, query: &StatusQuery) -> ClientResult<StatusReport> {
        self.run(|mut handshake| async move {
            let snapshot = handshake
                .rpc
                .query_status(&mut handshake.session, query)
                .await?;
            handshake.session.close().await;
            Ok(StatusReport {
                objects: handshake.objects,
                elapsed: handshake.elapsed,
                snapshot,
            })
        })
        .await
    }

    /// Handshakes, then subscribes to `query`.
    ///
    /// The returned subscription owns the session. When it ends with an
    /// error, call this again to resume.
    pub async fn subscribe(&self, query: &StatusQuery) -> ClientResult<Subscription> {
        let idle_timeout = self.idle_timeout;
        let shutdown = self.shutdown.clone();
        self.run(|mut handshake| {
            let shutdown = shutdown.clone();
            async move {
                handshake
                    .rpc
                    .subscribe(&mut handshake.session, query)
                    .await?;
                let subscription = Subscription::new(handshake.session).with_idle_timeout(idle_timeout);
                Ok(match shutdown {
                    Some(shutdown) => subscription.with_shutdown(shutdown),
                    None => subscription,
                })
            }
        })
        .await
    }

    /// Runs `op` after a successful handshake, retrying the whole sequence.
    ///
    /// `op` receives a fresh handshake on every attempt. Non-retryable
    /// errors are returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> ClientResult<T>
    where
        F: FnMut(Handshake) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let span = info_span!("handshake", attempt, max_attempts);
            let result = async {
                let handshake = self.handshake_once(attempt, started).await?;
                op(handshake).await
            }
            .instrument(span)
            .await;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                error!(attempts = attempt, error = %err, "Giving up");
                return Err(ClientError::HandshakeFailed {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            warn!(
                attempt,
                max_attempts,
                delay_secs = self.retry.delay.as_secs_f64(),
                error = %err,
                "Attempt failed, retrying"
            );
            self.pause().await?;
        }
    }

    async fn handshake_once(&self, attempt: u32, started: Instant) -> ClientResult<Handshake> {
        let mut resolved = self.resolver.resolve()?;
        if let Some(ref api_key) = self.api_key {
            resolved.endpoint.api_key = Some(api_key.clone());
        }

        let span = info_span!("session", socket = %resolved.endpoint);
        async {
            let mut session =
                Session::open(resolved.endpoint.clone(), self.session_options.clone()).await?;
            let rpc = RpcClient::for_endpoint(&resolved.endpoint);
            let objects = rpc.list_objects(&mut session).await?;
            debug!(objects = objects.len(), "Handshake complete");

            Ok(Handshake {
                session,
                rpc,
                resolved,
                objects,
                attempt,
                elapsed: started.elapsed(),
            })
        }
        .instrument(span)
        .await
    }

    /// Sleeps for the retry delay; fails with `Cancelled` on shutdown.
    pub async fn pause(&self) -> ClientResult<()> {
        let delay = self.retry.delay;
        match &self.shutdown {
            Some(shutdown) => tokio::select! {
                biased;
                _ = shutdown.wait() => Err(ClientError::Cancelled),
                _ = sleep(delay) => Ok(()),
            },
            None => {
                sleep(delay).await;
                Ok(())
            }
        }
    }
}
