//! The identity codec: no compression. The non-streaming side is a byte
//! copy; the streaming side delegates straight to the MessagePack streaming
//! parser.

use bytes::Bytes;

use super::{NonStreamingCodec, NonStreamingCodecFactory, StreamingCodecFactory};
use crate::error::Result;
use crate::parser::StreamingParser as MsgpackStreamingParser;

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl NonStreamingCodec for IdentityCodec {
    fn compress(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodecFactory;

impl NonStreamingCodecFactory for IdentityCodecFactory {
    fn new_codec(&self) -> Box<dyn NonStreamingCodec> {
        Box::new(IdentityCodec)
    }
}

/// Compressor side: every call just returns its input untouched.
#[derive(Debug, Default)]
pub struct IdentityCompressor;

impl super::StreamingCompressor for IdentityCompressor {
    fn compress(&mut self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Parser side: a thin pass-through to the MessagePack streaming parser,
/// since there is no compression framing to undo first.
#[derive(Debug, Default)]
pub struct IdentityStreamingParser {
    inner: MsgpackStreamingParser,
}

impl super::StreamingParser for IdentityStreamingParser {
    fn prepare_buffer(&mut self, n: usize) -> &mut [u8] {
        self.inner.prepare_buffer(n)
    }

    fn consumed(&mut self, k: usize) {
        self.inner.consumed(k)
    }

    fn parse_next(&mut self, k: usize) -> Result<bool> {
        self.inner.parse_next(k)
    }

    fn get(&mut self) -> Bytes {
        self.inner.get()
    }
}

impl StreamingCodecFactory for IdentityCodecFactory {
    fn new_compressor(&self) -> Box<dyn super::StreamingCompressor> {
        Box::new(IdentityCompressor)
    }

    fn new_parser(&self) -> Box<dyn super::StreamingParser> {
        Box::new(IdentityStreamingParser::default())
    }
}
