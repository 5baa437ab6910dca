//! Transport session over the Klipper API Unix socket.
//!
//! A session owns exactly one socket connection:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──► Connected ──► Closed | Failed
//! ```
//!
//! Any read or write failure moves the session to `Failed` and drops the
//! socket. A failed or closed session is never reconnected; the caller
//! builds a new one.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, trace, warn};

use klipperstat_core::Endpoint;
use klipperstat_protocol::{DEFAULT_MAX_FRAME_SIZE, Frame, FrameDecoder, Notification, encode_frame};

use crate::error::{ClientError, ClientResult};

const READ_CHUNK: usize = 4096;

/// When a read gives up, and the wait it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDeadline {
    at: Instant,
    budget: Duration,
}

impl ReadDeadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// The total wait this deadline allows, reported on timeout.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Closed locally or by the peer.
    Closed,
    /// A read or write failed.
    Failed,
}

/// Connection and read parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Connect attempts before giving up on the endpoint.
    pub connect_attempts: u32,
    /// Pause between failed connect attempts.
    pub attempt_delay: Duration,
    /// Deadline for each frame read, and for each connect attempt.
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Bytes buffered without a terminator before the stream is rejected.
    pub max_frame_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            attempt_delay: Duration::from_secs(2),
            read_timeout: Some(Duration::from_secs(10)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl SessionOptions {
    /// Builder: set the number of connect attempts.
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Builder: set the delay between connect attempts.
    pub fn with_attempt_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self
    }

    /// Builder: set the read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Builder: set the frame size limit.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

/// One connection to the Klipper API socket.
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    options: SessionOptions,
    state: SessionState,
    stream: Option<UnixStream>,
    decoder: FrameDecoder,
    notifications: VecDeque<Notification>,
}

impl Session {
    /// Creates a disconnected session for `endpoint`.
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        let decoder = FrameDecoder::with_max_frame_size(options.max_frame_size);
        Self {
            endpoint,
            options,
            state: SessionState::Disconnected,
            stream: None,
            decoder,
            notifications: VecDeque::new(),
        }
    }

    /// Creates a session and connects it.
    pub async fn open(endpoint: Endpoint, options: SessionOptions) -> ClientResult<Self> {
        let mut session = Self::new(endpoint, options);
        session.connect().await?;
        Ok(session)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: UnixStream, endpoint: Endpoint, options: SessionOptions) -> Self {
        let mut session = Self::new(endpoint, options);
        session.stream = Some(stream);
        session.state = SessionState::Connected;
        session
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the endpoint this session talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns true while the socket is usable.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Opens the socket, retrying up to `connect_attempts` times.
    ///
    /// The delay is applied between attempts only, so `n` attempts sleep
    /// `n - 1` times. Fails with [`ClientError::ConnectionExhausted`] once
    /// every attempt has failed.
    pub async fn connect(&mut self) -> ClientResult<()> {
        if self.state != SessionState::Disconnected {
            return Err(ClientError::SessionClosed);
        }
        self.transition(SessionState::Connecting);

        let path = self.endpoint.socket_path().to_path_buf();
        let attempts = self.options.connect_attempts.max(1);

        for attempt in 1..=attempts {
            debug!(socket = %path.display(), attempt, max_attempts = attempts, "Connecting");

            let result = match self.options.read_timeout {
                Some(limit) => timeout(limit, UnixStream::connect(&path))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
                    }),
                None => UnixStream::connect(&path).await,
            };

            match result {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.transition(SessionState::Connected);
                    return Ok(());
                }
                Err(source) => {
                    let err = ClientError::ConnectionRefused {
                        path: path.clone(),
                        source,
                    };
                    warn!(attempt, max_attempts = attempts, error = %err, "Connect attempt failed");
                }
            }

            if attempt < attempts {
                sleep(self.options.attempt_delay).await;
            }
        }

        self.transition(SessionState::Failed);
        Err(ClientError::ConnectionExhausted { path, attempts })
    }

    /// Reads the next frame within the configured read timeout.
    pub async fn read_frame(&mut self) -> ClientResult<Frame> {
        let deadline = self.options.read_timeout.map(ReadDeadline::after);
        self.read_frame_until(deadline).await
    }

    /// Reads the next frame, failing if `deadline` passes first.
    ///
    /// Bytes after the decoded frame stay buffered for the next call. A
    /// frame that fails to decode is consumed and reported as
    /// [`ClientError::MalformedFrame`]; the session stays usable unless the
    /// buffer overflowed.
    pub async fn read_frame_until(&mut self, deadline: Option<ReadDeadline>) -> ClientResult<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if !self.is_connected() {
                return Err(ClientError::SessionClosed);
            }

            match self.decoder.decode_next() {
                Ok(Some(frame)) => {
                    trace!(?frame, "Received frame");
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    if e.is_fatal() {
                        self.fail();
                    }
                    return Err(ClientError::MalformedFrame(e));
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(ClientError::SessionClosed);
            };
            let read = match deadline {
                Some(deadline) => match timeout_at(deadline.at, stream.read(&mut chunk)).await {
                    Ok(read) => read,
                    Err(_) => {
                        self.fail();
                        return Err(ClientError::ReadTimeout(deadline.budget.as_secs_f64()));
                    }
                },
                None => stream.read(&mut chunk).await,
            };

            match read {
                Ok(0) => {
                    debug!(buffered = self.decoder.buffered(), "Peer closed the connection");
                    self.stream = None;
                    self.transition(SessionState::Closed);
                    return Err(ClientError::PeerClosed);
                }
                Ok(n) => {
                    trace!(bytes = n, "Read from socket");
                    self.decoder.extend(&chunk[..n]);
                }
                Err(e) => {
                    warn!(error = %e, "Socket read failed");
                    self.fail();
                    return Err(ClientError::PeerClosed);
                }
            }
        }
    }

    /// Encodes `payload` and writes the whole frame.
    ///
    /// Any transport error fails the session.
    pub async fn write_frame<T: Serialize>(&mut self, payload: &T) -> ClientResult<()> {
        let bytes = encode_frame(payload)?;
        if !self.is_connected() {
            return Err(ClientError::SessionClosed);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::SessionClosed);
        };

        let result = match stream.write_all(&bytes).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.fail();
            return Err(ClientError::WriteFailed(e));
        }
        trace!(bytes = bytes.len(), "Wrote frame");
        Ok(())
    }

    /// Keeps a notification that arrived while waiting for a reply.
    pub fn queue_notification(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    /// Removes and returns the oldest queued notification.
    pub fn pop_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    /// Removes and returns every queued notification, oldest first.
    pub fn take_notifications(&mut self) -> VecDeque<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Shuts the socket down and moves to `Closed`.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
        }
        if matches!(
            self.state,
            SessionState::Connected | SessionState::Disconnected | SessionState::Connecting
        ) {
            self.transition(SessionState::Closed);
        }
    }

    fn fail(&mut self) {
        self.stream = None;
        self.transition(SessionState::Failed);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(socket = %self.endpoint, from = ?self.state, to = ?next, "Session state");
            self.state = next;
        }
    }
}
