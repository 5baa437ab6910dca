//! Live status updates after `objects/subscribe`.
//!
//! The subscription owns its [`Session`], so nothing else can read from the
//! socket while it runs. Every frame is handled the same way: if it carries
//! a status mapping (`params.status` on a push, `result.status` on the
//! subscribe acknowledgement) it becomes a [`StatusSnapshot`].
//!
//! The stream ends after exactly one terminal error: a session failure, an
//! error acknowledgement, or [`ClientError::Cancelled`] once shutdown is
//! requested. Resuming means running the whole handshake again.

use std::time::Duration;

use futures_util::Stream;
use klipperstat_core::StatusSnapshot;
use klipperstat_protocol::{Frame, Outcome, Response, methods, request_ids};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ClientResult};
use crate::session::{ReadDeadline, Session};
use crate::shutdown::ShutdownHandle;

/// A lazy, non-restartable sequence of status snapshots.
#[derive(Debug)]
pub struct Subscription {
    session: Session,
    idle_timeout: Option<Duration>,
    shutdown: Option<ShutdownHandle>,
    finished: bool,
}

enum Step {
    Frame(ClientResult<Frame>),
    Cancelled,
}

impl Subscription {
    /// Wraps a session on which `objects/subscribe` has been sent.
    ///
    /// Notifications already queued on the session are yielded first. The
    /// idle timeout defaults to the session read timeout.
    pub fn new(session: Session) -> Self {
        let idle_timeout = session.options().read_timeout;
        Self {
            session,
            idle_timeout,
            shutdown: None,
            finished: false,
        }
    }

    /// Builder: fail with `ReadTimeout` if no frame arrives for this long.
    /// `None` waits indefinitely.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Builder: end the stream when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns true once the terminal item has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` only after the terminal error has been returned.
    pub async fn next(&mut self) -> Option<ClientResult<StatusSnapshot>> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(notification) = self.session.pop_notification() {
                match notification.status() {
                    Some(status) => return Some(Ok(StatusSnapshot::from_status(status))),
                    None => {
                        trace!(method = %notification.method, "Skipping queued notification without status");
                        continue;
                    }
                }
            }

            if self.shutdown.as_ref().is_some_and(ShutdownHandle::is_shutdown) {
                return Some(Err(self.finish(ClientError::Cancelled).await));
            }

            let deadline = self.idle_timeout.map(ReadDeadline::after);
            let step = match &self.shutdown {
                Some(shutdown) => tokio::select! {
                    biased;
                    _ = shutdown.wait() => Step::Cancelled,
                    frame = self.session.read_frame_until(deadline) => Step::Frame(frame),
                },
                None => Step::Frame(self.session.read_frame_until(deadline).await),
            };

            match step {
                Step::Cancelled => {
                    debug!("Subscription cancelled");
                    return Some(Err(self.finish(ClientError::Cancelled).await));
                }
                Step::Frame(Ok(frame)) => {
                    if let Some(status) = frame.status() {
                        return Some(Ok(StatusSnapshot::from_status(status)));
                    }
                    match frame {
                        Frame::Response(Response {
                            id: request_ids::SUBSCRIBE,
                            outcome: Outcome::Error(error),
                        }) => {
                            let err = ClientError::RpcError {
                                method: methods::OBJECTS_SUBSCRIBE.to_string(),
                                error,
                            };
                            return Some(Err(self.finish(err).await));
                        }
                        other => trace!(frame = ?other, "Skipping frame without status"),
                    }
                }
                Step::Frame(Err(ClientError::MalformedFrame(e))) if !e.is_fatal() => {
                    warn!(error = %e, "Discarding malformed frame");
                }
                Step::Frame(Err(e)) => {
                    debug!(error = %e, "Subscription ended");
                    return Some(Err(self.finish(e).await));
                }
            }
        }
    }

    /// Converts into a [`Stream`] of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<StatusSnapshot>> {
        futures_util::stream::unfold(self, |mut subscription| async move {
            let item = subscription.next().await?;
            Some((item, subscription))
        })
    }

    /// Closes the underlying session.
    pub async fn close(mut self) {
        self.finished = true;
        self.session.close().await;
    }

    async fn finish(&mut self, err: ClientError) -> ClientError {
        self.finished = true;
        self.session.close().await;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcClient;
    use crate::session::SessionOptions;
    use crate::shutdown::SignalHandler;
    use futures_util::StreamExt;
    use klipperstat_core::Endpoint;
    use klipperstat_protocol::{Notification, StatusQuery};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn pair() -> (Session, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let session = Session::from_stream(ours, Endpoint::new("/test.sock"), SessionOptions::default());
        (session, theirs)
    }

    async fn push(peer: &mut UnixStream, frame: serde_json::Value) {
        let mut bytes = serde_json::to_vec(&frame).unwrap();
        bytes.push(0x03);
        peer.write_all(&bytes).await.unwrap();
    }

    #[tokio::test]
    async fn ack_status_is_first_snapshot() {
        let (session, mut peer) = pair();
        push(
            &mut peer,
            json!({"id": 456, "result": {"eventtime": 1.0, "status": {"print_stats": {"state": "standby"}}}}),
        )
        .await;
        push(
            &mut peer,
            json!({"method": "notify_status_update", "params": {"status": {"toolhead": {"position": [1, 2, 3]}}, "eventtime": 2.0}}),
        )
        .await;
        drop(peer);

        let mut sub = Subscription::new(session);
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.print_state.as_deref(), Some("standby"));
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.position.unwrap().z, 3.0);
        assert!(matches!(sub.next().await, Some(Err(ClientError::PeerClosed))));
        assert!(sub.next().await.is_none());
        assert!(sub.is_finished());
    }

    #[tokio::test]
    async fn queued_notifications_come_first() {
        let (mut session, mut peer) = pair();
        session.queue_notification(Notification {
            method: "notify_status_update".into(),
            params: json!({"status": {"print_stats": {"state": "queued"}}}),
        });
        push(
            &mut peer,
            json!({"method": "notify_status_update", "params": {"status": {"print_stats": {"state": "live"}}}}),
        )
        .await;

        let mut sub = Subscription::new(session);
        let states: Vec<_> = [sub.next().await, sub.next().await]
            .into_iter()
            .map(|item| item.unwrap().unwrap().print_state.unwrap())
            .collect();
        assert_eq!(states, ["queued", "live"]);
    }

    #[tokio::test]
    async fn error_ack_is_terminal() {
        let (mut session, mut peer) = pair();
        RpcClient::default()
            .subscribe(&mut session, &StatusQuery::new().all_fields("toolhead"))
            .await
            .unwrap();
        push(&mut peer, json!({"id": 456, "error": {"message": "denied"}})).await;

        let mut sub = Subscription::new(session);
        match sub.next().await {
            Some(Err(ClientError::RpcError { method, .. })) => {
                assert_eq!(method, "objects/subscribe")
            }
            other => panic!("expected RpcError, got {other:?}"),
        }
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_and_statusless_frames_are_skipped() {
        let (session, mut peer) = pair();
        peer.write_all(b"{broken\x03").await.unwrap();
        push(&mut peer, json!({"method": "notify_gcode_response", "params": ["ok"]})).await;
        push(
            &mut peer,
            json!({"method": "notify_status_update", "params": {"status": {"print_stats": {"state": "paused"}}}}),
        )
        .await;

        let mut sub = Subscription::new(session);
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.print_state.as_deref(), Some("paused"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_ends_stream() {
        let (session, _peer) = pair();
        let mut sub = Subscription::new(session).with_idle_timeout(Some(Duration::from_secs(5)));
        // reports the idle budget, not the 10s session read timeout
        assert!(matches!(
            sub.next().await,
            Some(Err(ClientError::ReadTimeout(secs))) if secs == 5.0
        ));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_read() {
        let (session, _peer) = pair();
        let handler = SignalHandler::new();
        let mut sub = Subscription::new(session)
            .with_idle_timeout(None)
            .with_shutdown(handler.shutdown_handle());

        let trigger = handler.shutdown_handle();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.trigger();
        });

        assert!(matches!(sub.next().await, Some(Err(ClientError::Cancelled))));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_adapter_yields_in_order() {
        let (session, mut peer) = pair();
        for z in [1, 2, 3] {
            push(
                &mut peer,
                json!({"method": "notify_status_update", "params": {"status": {"toolhead": {"position": [0, 0, z]}}}}),
            )
            .await;
        }
        drop(peer);

        let items: Vec<_> = Subscription::new(session).into_stream().collect().await;
        assert_eq!(items.len(), 4);
        let zs: Vec<f64> = items[..3]
            .iter()
            .map(|item| item.as_ref().unwrap().position.unwrap().z)
            .collect();
        assert_eq!(zs, [1.0, 2.0, 3.0]);
        assert!(matches!(items[3], Err(ClientError::PeerClosed)));
    }
}
