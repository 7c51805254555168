//! The MessagePack streaming parser: feeds arbitrary byte chunks in and
//! yields zero or more fully-decoded messages out, without ever requiring a
//! whole message to arrive in one read.
//!
//! This is the component every streaming codec (identity or zstd) delegates
//! to once it has produced plain MessagePack bytes. See [`crate::codec`] for
//! the codecs that sit in front of it.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::error::{Error, Result};

/// Incremental decoder over a byte stream of concatenated MessagePack
/// values.
///
/// Resolves the open question of how `consumed()` and `parse_next()`
/// interact (see `DESIGN.md`) by having `parse_next(k)` always record `k` via
/// an internal `consumed(k)` call before attempting to parse, so callers
/// never need to choose between the two entry points themselves.
#[derive(Debug, Default)]
pub struct StreamingParser {
    buffer: Buffer,
    /// Bytes written into `buffer` so far that have not yet been handed to
    /// `get()`.
    consumed_len: usize,
    /// Length, in bytes, of the most recently fully-decoded value sitting at
    /// the front of `buffer`. Zero means "no decoded value waiting".
    parsed_len: usize,
}

impl StreamingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the buffer has room for `n` more bytes past what has already
    /// been written, and return that span to write into.
    pub fn prepare_buffer(&mut self, n: usize) -> &mut [u8] {
        self.buffer.prepare_region(self.consumed_len, n)
    }

    /// Record that the caller wrote `k` bytes into the span from
    /// `prepare_buffer`, without attempting to parse them yet.
    pub fn consumed(&mut self, k: usize) {
        self.consumed_len += k;
    }

    /// Record `k` written bytes (as `consumed` does) and then attempt to
    /// decode one MessagePack value from the front of the buffer.
    ///
    /// Returns `Ok(true)` if a complete value is now available via `get()`.
    /// Returns `Ok(false)` on insufficient bytes, preserving all state so a
    /// later call with more data picks up where this one left off. A
    /// malformed leading byte is a `ParseError`, not insufficient bytes.
    pub fn parse_next(&mut self, k: usize) -> Result<bool> {
        self.consumed(k);

        if self.parsed_len > 0 {
            // A previously decoded value hasn't been collected via get() yet.
            return Ok(true);
        }

        let window = &self.buffer.data()[..self.consumed_len];
        let mut cursor = window;
        let starting_len = cursor.len();

        match rmpv::decode::read_value_ref(&mut cursor) {
            Ok(_) => {
                self.parsed_len = starting_len - cursor.len();
                Ok(true)
            }
            Err(err) if is_insufficient_data(&err) => Ok(false),
            Err(err) => Err(Error::parse_error_with_data(
                err.to_string(),
                Bytes::copy_from_slice(window),
            )),
        }
    }

    /// Collect the value `parse_next` most recently confirmed as complete,
    /// removing it from the buffer. Panics if called without a prior
    /// `parse_next` returning `true`: callers are expected to check the
    /// return value first, matching the contract `get()` documents in the
    /// framing layer above.
    pub fn get(&mut self) -> Bytes {
        assert!(self.parsed_len > 0, "get() called with nothing parsed");
        let bytes = Bytes::copy_from_slice(&self.buffer.data()[..self.parsed_len]);
        self.buffer.consume(self.parsed_len);
        self.consumed_len -= self.parsed_len;
        self.parsed_len = 0;
        bytes
    }
}

fn is_insufficient_data(err: &rmpv::decode::Error) -> bool {
    use std::io::ErrorKind;
    match err {
        rmpv::decode::Error::InvalidMarkerRead(e) | rmpv::decode::Error::InvalidDataRead(e) => {
            e.kind() == ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::pack_request;
    use rmpv::Value;

    fn feed(parser: &mut StreamingParser, bytes: &[u8]) {
        let region = parser.prepare_buffer(bytes.len());
        region.copy_from_slice(bytes);
    }

    #[test]
    fn parses_a_whole_message_delivered_at_once() {
        let msg = pack_request(1, "echo", vec![Value::from("abc")]);
        let mut parser = StreamingParser::new();
        feed(&mut parser, &msg);
        assert!(parser.parse_next(msg.len()).unwrap());
        assert_eq!(parser.get(), msg);
    }

    #[test]
    fn reports_insufficient_bytes_without_losing_state() {
        let msg = pack_request(1, "echo", vec![Value::from("abc")]);
        let mut parser = StreamingParser::new();
        feed(&mut parser, &msg[..msg.len() - 1]);
        assert!(!parser.parse_next(msg.len() - 1).unwrap());

        feed(&mut parser, &msg[msg.len() - 1..]);
        assert!(parser.parse_next(1).unwrap());
        assert_eq!(parser.get(), msg);
    }

    #[test]
    fn recovers_two_messages_from_one_chunk() {
        let a = pack_request(1, "echo", vec![Value::from("a")]);
        let b = pack_request(2, "echo", vec![Value::from("b")]);
        let mut combined = Vec::new();
        combined.extend_from_slice(&a);
        combined.extend_from_slice(&b);

        let mut parser = StreamingParser::new();
        feed(&mut parser, &combined);
        assert!(parser.parse_next(combined.len()).unwrap());
        assert_eq!(parser.get(), a);

        // second message must be re-requested with parse_next(0)
        assert!(parser.parse_next(0).unwrap());
        assert_eq!(parser.get(), b);
    }

    #[test]
    fn parse_next_zero_tries_whatever_is_already_buffered() {
        let mut parser = StreamingParser::new();
        assert!(!parser.parse_next(0).unwrap());
    }

    #[test]
    fn malformed_leading_byte_is_a_parse_error() {
        let mut parser = StreamingParser::new();
        // 0xc1 is a reserved/never-used MessagePack marker.
        feed(&mut parser, &[0xc1]);
        assert!(matches!(
            parser.parse_next(1),
            Err(Error::ParseError { .. })
        ));
    }
}
