//! Codec layer: the non-streaming and streaming compressor/parser traits,
//! and the two implementations (`identity`, `zstd`) that satisfy them.
//!
//! Non-streaming codecs operate on a whole message at once (used by UDP,
//! where each datagram already is one message). Streaming codecs operate on
//! byte chunks and compose with [`crate::parser::StreamingParser`] to
//! recover message boundaries from a continuous TCP byte stream.

pub mod identity;
pub mod zstd_codec;

use bytes::Bytes;

use crate::error::Result;

/// A codec that transforms one whole message into one whole message, used
/// where the transport already delivers message-sized units (UDP
/// datagrams).
pub trait NonStreamingCodec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Bytes>;
    fn decompress(&self, data: &[u8]) -> Result<Bytes>;
}

/// The write side of a streaming codec: wraps outgoing message bytes so that
/// each `compress` call produces a self-delimited unit on the wire (for
/// zstd, a frame ended by the library's end-of-frame marker; for identity,
/// just the bytes themselves).
pub trait StreamingCompressor: Send {
    fn compress(&mut self, data: &[u8]) -> Result<Bytes>;
}

/// The read side of a streaming codec: accepts raw bytes off the wire
/// incrementally and exposes the same `prepare_buffer`/`consumed`/
/// `parse_next`/`get` protocol as [`crate::parser::StreamingParser`], after
/// undoing whatever framing the compressor applied.
pub trait StreamingParser: Send {
    fn prepare_buffer(&mut self, n: usize) -> &mut [u8];
    fn consumed(&mut self, k: usize);
    fn parse_next(&mut self, k: usize) -> Result<bool>;
    fn get(&mut self) -> Bytes;
}

/// Picks a codec's concrete implementations out of configuration. Mirrors
/// the non-goal-excluded fluent builder surface only in spirit: this factory
/// is the minimal seam the transport layer needs, not a public builder API.
pub trait StreamingCodecFactory: Send + Sync {
    fn new_compressor(&self) -> Box<dyn StreamingCompressor>;
    fn new_parser(&self) -> Box<dyn StreamingParser>;
}

pub trait NonStreamingCodecFactory: Send + Sync {
    fn new_codec(&self) -> Box<dyn NonStreamingCodec>;
}
