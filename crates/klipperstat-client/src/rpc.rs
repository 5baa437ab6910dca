//! Correlated JSON-RPC calls over a [`Session`].
//!
//! At most one call is in flight per session: a call drains frames until
//! the reply with its id arrives. Notifications seen meanwhile are queued on
//! the session for a later subscription; replies to other ids are dropped.

use serde_json::Value;
use tracing::{debug, trace};

use klipperstat_core::{Endpoint, StatusSnapshot};
use klipperstat_protocol::{Frame, Request, StatusQuery, methods};

use crate::error::{ClientError, ClientResult};
use crate::session::{ReadDeadline, Session};

/// Builds and correlates requests, embedding the API key when one is set.
#[derive(Clone, Default)]
pub struct RpcClient {
    api_key: Option<String>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RpcClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// Uses the API key of `endpoint`.
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self::new(endpoint.api_key.clone())
    }

    /// Sends `method` with id `id` and waits for the matching reply.
    ///
    /// Returns the `result` member. The whole call shares one read deadline,
    /// so unrelated frames cannot extend it.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RpcError`] if the reply carries an `error` member
    /// - [`ClientError::ReadTimeout`] if no reply arrives in time
    /// - [`ClientError::PeerClosed`] if the connection drops first
    /// - [`ClientError::MalformedFrame`] if any frame fails to decode
    pub async fn call(
        &self,
        session: &mut Session,
        method: &str,
        params: Option<Value>,
        id: u64,
    ) -> ClientResult<Value> {
        let mut request = Request::new(method, id);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        self.call_request(session, request).await
    }

    async fn call_request(&self, session: &mut Session, request: Request) -> ClientResult<Value> {
        let request = self.authorize(request);
        let id = request.id;

        debug!(method = %request.method, request_id = id, "Sending request");
        session.write_frame(&request).await?;

        let deadline = session.options().read_timeout.map(ReadDeadline::after);
        loop {
            match session.read_frame_until(deadline).await? {
                Frame::Response(response) if response.id == id => {
                    debug!(method = %request.method, request_id = id, "Received reply");
                    return response.into_result().map_err(|error| ClientError::RpcError {
                        method: request.method.clone(),
                        error,
                    });
                }
                Frame::Response(response) => {
                    debug!(
                        expected = id,
                        received = response.id,
                        "Discarding reply to another request"
                    );
                }
                Frame::Notification(notification) => {
                    trace!(method = %notification.method, "Queueing notification");
                    session.queue_notification(notification);
                }
            }
        }
    }

    /// Sends a request without waiting for its reply.
    pub async fn send(&self, session: &mut Session, request: Request) -> ClientResult<()> {
        let request = self.authorize(request);
        debug!(method = %request.method, request_id = request.id, "Sending request");
        session.write_frame(&request).await
    }

    /// Lists the status objects the printer supports (`objects/list`).
    pub async fn list_objects(&self, session: &mut Session) -> ClientResult<Vec<String>> {
        let result = self.call_request(session, Request::list_objects()).await?;
        let objects = result
            .get("objects")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ClientError::unexpected_response(methods::OBJECTS_LIST, "missing result.objects")
            })?;
        Ok(objects
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// Queries the selected objects once (`printer.objects.query`).
    pub async fn query_status(
        &self,
        session: &mut Session,
        query: &StatusQuery,
    ) -> ClientResult<StatusSnapshot> {
        let result = self.call_request(session, Request::query(query)).await?;
        let status = result
            .get("status")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ClientError::unexpected_response(methods::OBJECTS_QUERY, "missing result.status")
            })?;
        Ok(StatusSnapshot::from_status(status))
    }

    /// Issues `objects/subscribe` without awaiting the acknowledgement.
    ///
    /// The acknowledgement and every later push are read by the
    /// subscription stream.
    pub async fn subscribe(&self, session: &mut Session, query: &StatusQuery) -> ClientResult<()> {
        self.send(session, Request::subscribe(query)).await
    }

    fn authorize(&self, request: Request) -> Request {
        request.with_api_key(self.api_key.clone())
    }
}
