//! Request, response and notification types for the Klipper API socket.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::JSONRPC_VERSION;
use crate::error::{ProtocolError, ProtocolResult};

/// Method names used by the status client.
pub mod methods {
    /// Lists the status objects the printer exposes.
    pub const OBJECTS_LIST: &str = "objects/list";
    /// One-shot status query.
    pub const OBJECTS_QUERY: &str = "printer.objects.query";
    /// Establishes a push stream of status updates.
    pub const OBJECTS_SUBSCRIBE: &str = "objects/subscribe";
}

/// Fixed request ids per call site.
///
/// At most one request of each kind is outstanding on a session, so a
/// constant id per kind is enough for correlation.
pub mod request_ids {
    pub const LIST: u64 = 123;
    pub const QUERY: u64 = 1;
    pub const SUBSCRIBE: u64 = 456;
}

/// An outgoing JSON-RPC request.
///
/// `params` and `api_key` are omitted from the wire body entirely when
/// unset, not sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Request {
    /// Creates a request with no params and no API key.
    pub fn new(method: impl Into<String>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
            id,
            api_key: None,
        }
    }

    /// Builder: set the params mapping.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Builder: attach an API key, if one is present.
    pub fn with_api_key(mut self, api_key: Option<impl Into<String>>) -> Self {
        self.api_key = api_key.map(Into::into);
        self
    }

    /// Creates an `objects/list` request.
    pub fn list_objects() -> Self {
        Self::new(methods::OBJECTS_LIST, request_ids::LIST)
    }

    /// Creates a `printer.objects.query` request.
    pub fn query(query: &StatusQuery) -> Self {
        Self::new(methods::OBJECTS_QUERY, request_ids::QUERY).with_params(query.to_params())
    }

    /// Creates an `objects/subscribe` request.
    pub fn subscribe(query: &StatusQuery) -> Self {
        Self::new(methods::OBJECTS_SUBSCRIBE, request_ids::SUBSCRIBE)
            .with_params(query.to_params())
    }
}

/// Selection of status objects and fields for query/subscribe.
///
/// A `None` field list asks for every field of the object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    pub objects: BTreeMap<String, Option<Vec<String>>>,
}

impl StatusQuery {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: select specific fields of an object.
    pub fn object<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.objects.insert(
            name.into(),
            Some(fields.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Builder: select every field of an object.
    pub fn all_fields(mut self, name: impl Into<String>) -> Self {
        self.objects.insert(name.into(), None);
        self
    }

    /// Returns true if no objects are selected.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Builds the `params` mapping sent on the wire.
    pub fn to_params(&self) -> Value {
        let objects: Map<String, Value> = self
            .objects
            .iter()
            .map(|(name, fields)| {
                let fields = match fields {
                    Some(fields) => Value::from(fields.clone()),
                    None => Value::Null,
                };
                (name.clone(), fields)
            })
            .collect();
        json!({ "objects": objects })
    }
}

/// A decoded incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply correlated to a request by id.
    Response(Response),
    /// Unsolicited push from the peer.
    Notification(Notification),
}

impl Frame {
    /// Classifies a decoded JSON value by the keys it carries.
    ///
    /// A non-null `id` makes the frame a response, which must then carry
    /// `error` or `result`. Without an id, a string `method` makes it a
    /// notification. Anything else is rejected.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::unexpected_shape("frame is not a JSON object"));
        };

        match map.remove("id") {
            None | Some(Value::Null) => {}
            Some(raw_id) => {
                let id = raw_id.as_u64().ok_or_else(|| {
                    ProtocolError::unexpected_shape(format!("non-integer response id: {}", raw_id))
                })?;

                if let Some(error) = map.remove("error").filter(|e| !e.is_null()) {
                    return Ok(Self::Response(Response {
                        id,
                        outcome: Outcome::Error(ErrorPayload(error)),
                    }));
                }
                if let Some(result) = map.remove("result") {
                    return Ok(Self::Response(Response {
                        id,
                        outcome: Outcome::Result(result),
                    }));
                }
                return Err(ProtocolError::unexpected_shape(format!(
                    "response {} has neither result nor error",
                    id
                )));
            }
        }

        match map.remove("method") {
            Some(Value::String(method)) => Ok(Self::Notification(Notification {
                method,
                params: map.remove("params").unwrap_or(Value::Null),
            })),
            _ => Err(ProtocolError::unexpected_shape(
                "frame has neither an id nor a method",
            )),
        }
    }

    /// Returns the response id, if this is a response.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Response(response) => Some(response.id),
            Self::Notification(_) => None,
        }
    }

    /// Returns the status mapping carried by this frame.
    ///
    /// Notifications carry it in `params.status`; a subscribe or query
    /// reply carries it in `result.status`.
    pub fn status(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Notification(notification) => notification.status(),
            Self::Response(Response {
                outcome: Outcome::Result(result),
                ..
            }) => result.get("status").and_then(Value::as_object),
            Self::Response(_) => None,
        }
    }
}

/// A reply to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub outcome: Outcome,
}

impl Response {
    /// Converts into the result value, or the error payload.
    pub fn into_result(self) -> Result<Value, ErrorPayload> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }
}

/// Outcome of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ErrorPayload),
}

/// The `error` member of a failed response, kept as sent by the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload(pub Value);

impl ErrorPayload {
    /// Returns a human-readable message for the error.
    ///
    /// Uses `error.message` when the peer sent one, otherwise the raw
    /// value.
    pub fn message(&self) -> String {
        match &self.0 {
            Value::String(message) => message.clone(),
            Value::Object(map) => match map.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => self.0.to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// An unsolicited message pushed by the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    /// Returns `params.status` if it is a mapping.
    pub fn status(&self) -> Option<&Map<String, Value>> {
        self.params.get("status").and_then(Value::as_object)
    }
}
