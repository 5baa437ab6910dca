//! ETX-terminated message framing.
//!
//! Frames are encoded as compact JSON followed by a single [`ETX`] byte.
//! Decoding scans for the first terminator; anything after it belongs to
//! the next frame and stays buffered.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Frame;
use crate::{DEFAULT_MAX_FRAME_SIZE, ETX};

/// Encodes a payload into a wire frame.
///
/// The terminator is appended as-is; the JSON body is not scanned or
/// escaped for embedded terminator bytes.
///
/// # Example
///
/// ```rust
/// use klipperstat_protocol::{encode_frame, Request};
///
/// let bytes = encode_frame(&Request::new("objects/list", 123)).unwrap();
/// assert_eq!(bytes.last(), Some(&0x03));
/// ```
pub fn encode_frame<T: Serialize>(payload: &T) -> ProtocolResult<Vec<u8>> {
    let mut buffer = serde_json::to_vec(payload).map_err(ProtocolError::Serialization)?;
    buffer.push(ETX);
    Ok(buffer)
}

/// Splits a buffer at the first terminator.
///
/// Returns the frame body (terminator excluded) and the bytes after the
/// terminator, or `None` if no complete frame is buffered yet.
pub fn split_frame(buffer: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = buffer.iter().position(|&b| b == ETX)?;
    Some((&buffer[..pos], &buffer[pos + 1..]))
}

/// Decodes the first frame in `buffer` as raw JSON.
///
/// Returns the decoded value and the remaining bytes, or `None` and the
/// unchanged buffer when more input is needed.
///
/// # Example
///
/// ```rust
/// use klipperstat_protocol::decode_stream;
///
/// let (value, rest) = decode_stream(b"{\"id\":1}\x03{\"id\"").unwrap();
/// assert_eq!(value.unwrap()["id"], 1);
/// assert_eq!(rest, b"{\"id\"");
///
/// let (value, rest) = decode_stream(rest).unwrap();
/// assert!(value.is_none());
/// assert_eq!(rest, b"{\"id\"");
/// ```
pub fn decode_stream(buffer: &[u8]) -> ProtocolResult<(Option<Value>, &[u8])> {
    match split_frame(buffer) {
        Some((body, rest)) => {
            let value = serde_json::from_slice(body).map_err(ProtocolError::InvalidJson)?;
            Ok((Some(value), rest))
        }
        None => Ok((None, buffer)),
    }
}

/// Incremental decoder that accumulates stream bytes into frames.
///
/// Bytes are appended with [`extend`](Self::extend) as they arrive from the
/// socket; [`decode_next`](Self::decode_next) yields complete frames in
/// stream order and keeps partial input buffered across calls.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder that rejects frames larger than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
        }
    }

    /// Appends bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Decodes the next complete frame, if one is buffered.
    ///
    /// A frame whose body fails to decode is removed from the buffer before
    /// the error is returned, so the caller may keep decoding after it.
    /// Empty frames (back-to-back terminators) are skipped.
    pub fn decode_next(&mut self) -> ProtocolResult<Option<Frame>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == ETX) else {
                if self.buffer.len() > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size: self.buffer.len(),
                        max: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            let mut body: Vec<u8> = self.buffer.drain(..=pos).collect();
            body.pop();

            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let value: Value = serde_json::from_slice(&body).map_err(ProtocolError::InvalidJson)?;
            return Frame::from_value(value).map(Some);
        }
    }

    /// Returns the number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no undecoded bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Notification, Outcome};
    use serde_json::json;

    fn response_bytes(id: u64) -> Vec<u8> {
        encode_frame(&json!({"id": id, "result": {"objects": ["toolhead"]}})).unwrap()
    }

    fn status_notification() -> Value {
        json!({
            "method": "notify_status_update",
            "params": {"status": {"toolhead": {"position": [1, 2, 3]}}}
        })
    }

    #[test]
    fn encode_appends_single_terminator() {
        let bytes = encode_frame(&json!({"id": 1})).unwrap();
        assert_eq!(bytes, b"{\"id\":1}\x03");
    }

    #[test]
    fn split_frame_without_terminator() {
        assert!(split_frame(b"{\"id\":1}").is_none());
        assert!(split_frame(b"").is_none());
    }

    #[test]
    fn split_frame_keeps_remainder() {
        let (body, rest) = split_frame(b"abc\x03def\x03").unwrap();
        assert_eq!(body, b"abc");
        assert_eq!(rest, b"def\x03");
    }

    #[test]
    fn decode_stream_two_frames_in_order() {
        let v = json!({"id": 7, "result": {"a": 1}});
        let w = status_notification();
        let mut bytes = encode_frame(&v).unwrap();
        bytes.extend(encode_frame(&w).unwrap());

        let (first, rest) = decode_stream(&bytes).unwrap();
        assert_eq!(first, Some(v));
        let (second, rest) = decode_stream(rest).unwrap();
        assert_eq!(second, Some(w));
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_stream_invalid_json() {
        let result = decode_stream(b"{not json\x03");
        assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn decoder_waits_for_terminator() {
        let bytes = response_bytes(123);
        let (body, terminator) = bytes.split_at(bytes.len() - 1);

        let mut decoder = FrameDecoder::new();
        decoder.extend(body);
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.buffered(), body.len());

        decoder.extend(terminator);
        let frame = decoder.decode_next().unwrap().unwrap();
        assert_eq!(frame.id(), Some(123));
        assert!(decoder.is_empty());
    }

    #[test]
    fn decoder_any_chunking_yields_exactly_one_frame() {
        let bytes = encode_frame(&status_notification()).unwrap();

        for chunk_size in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoder.extend(chunk);
                while let Some(frame) = decoder.decode_next().unwrap() {
                    frames.push(frame);
                }
            }
            assert_eq!(frames.len(), 1, "chunk size {}", chunk_size);
            let Frame::Notification(Notification { method, .. }) = &frames[0] else {
                panic!("expected notification");
            };
            assert_eq!(method, "notify_status_update");
        }
    }

    #[test]
    fn decoder_any_chunking_keeps_frame_pair_in_order() {
        let mut bytes = encode_frame(&status_notification()).unwrap();
        bytes.extend(response_bytes(7));

        for chunk_size in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoder.extend(chunk);
                while let Some(frame) = decoder.decode_next().unwrap() {
                    frames.push(frame);
                }
            }
            assert_eq!(frames.len(), 2, "chunk size {}", chunk_size);
            assert!(
                matches!(&frames[0], Frame::Notification(n) if n.method == "notify_status_update"),
                "chunk size {}",
                chunk_size
            );
            assert_eq!(frames[1].id(), Some(7), "chunk size {}", chunk_size);
            assert!(decoder.is_empty());
        }
    }

    #[test]
    fn decoder_coalesced_frames_with_partial_tail() {
        let mut bytes = response_bytes(1);
        bytes.extend(encode_frame(&status_notification()).unwrap());
        let tail = response_bytes(2);
        bytes.extend(&tail[..5]);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);

        assert_eq!(decoder.decode_next().unwrap().unwrap().id(), Some(1));
        assert!(matches!(
            decoder.decode_next().unwrap(),
            Some(Frame::Notification(_))
        ));
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.buffered(), 5);

        decoder.extend(&tail[5..]);
        assert_eq!(decoder.decode_next().unwrap().unwrap().id(), Some(2));
    }

    #[test]
    fn decoder_recovers_after_malformed_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"garbage\x03");
        decoder.extend(&response_bytes(9));

        assert!(matches!(
            decoder.decode_next(),
            Err(ProtocolError::InvalidJson(_))
        ));
        let frame = decoder.decode_next().unwrap().unwrap();
        let Frame::Response(response) = frame else {
            panic!("expected response");
        };
        assert_eq!(response.id, 9);
        assert!(matches!(response.outcome, Outcome::Result(_)));
    }

    #[test]
    fn decoder_skips_empty_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"\x03\x03 \x03");
        decoder.extend(&response_bytes(4));
        assert_eq!(decoder.decode_next().unwrap().unwrap().id(), Some(4));
    }

    #[test]
    fn decoder_rejects_oversized_buffer() {
        let mut decoder = FrameDecoder::with_max_frame_size(16);
        decoder.extend(&[b'a'; 17]);
        let err = decoder.decode_next().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FrameTooLarge { size: 17, max: 16 }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn decoder_unexpected_shape() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"[1,2,3]\x03");
        let err = decoder.decode_next().unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedShape(_)));
        assert!(!err.is_fatal());
    }
}
