//! Wire protocol for the Klipper API Unix socket.
//!
//! Klipper speaks JSON-RPC 2.0 over a stream socket. Every message is a
//! single JSON document followed by one ETX byte (`0x03`):
//!
//! ```text
//! +------------------+------+
//! |  JSON payload    | 0x03 |
//! +------------------+------+
//! ```
//!
//! The terminator is never escaped. A JSON body containing a raw `0x03`
//! byte would split the frame; the peer never produces one, and this crate
//! does not try to compensate.
//!
//! # Message shapes
//!
//! Incoming frames are decoded into a closed set of variants, see [`Frame`]:
//! - responses carry an `id` and either `result` or `error`
//! - notifications carry a `method` and `params`, and no `id`
//!
//! # Example
//!
//! ```rust
//! use klipperstat_protocol::{encode_frame, FrameDecoder, Frame, Request, methods};
//!
//! let request = Request::new(methods::OBJECTS_LIST, 123);
//! let bytes = encode_frame(&request).unwrap();
//! assert_eq!(bytes.last(), Some(&0x03));
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(br#"{"id":123,"result":{"objects":["toolhead"]}}"#);
//! assert!(decoder.decode_next().unwrap().is_none());
//! decoder.extend(&[0x03]);
//! assert!(matches!(decoder.decode_next().unwrap(), Some(Frame::Response(_))));
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameDecoder, decode_stream, encode_frame, split_frame};
pub use types::{
    ErrorPayload, Frame, Notification, Outcome, Request, Response, StatusQuery, methods,
    request_ids,
};

/// Frame terminator byte (ASCII ETX).
pub const ETX: u8 = 0x03;

/// JSON-RPC version string sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default cap on bytes buffered while waiting for a terminator (4 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;
