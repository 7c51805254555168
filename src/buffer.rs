//! Growable byte buffer with front-consume, used by the streaming codecs and
//! the MessagePack streaming parser to amortize allocation across many small
//! reads.
//!
//! `bytes::BytesMut` already gives amortized append and a `split_to`-based
//! front-consume. `Buffer` is a thin wrapper pinning down the specific
//! capacity-growth policy (double from a 1024-byte floor) and the exact
//! `consume` contract the parsers are written against, rather than relying on
//! whatever growth strategy `BytesMut::reserve` happens to use internally.

use bytes::{BufMut, Bytes, BytesMut};

const INITIAL_CAPACITY: usize = 1024;

/// Immutable, reference-counted byte blob: the shared-ownership view a
/// codec's compress step or a diagnostic hands out over a `Buffer`
/// snapshot. `bytes::Bytes` already provides an O(1) atomic-refcount clone
/// and byte-equality, so this is a plain alias rather than a new type.
pub type SharedBinary = Bytes;

/// A contiguous, growable byte region with an explicit front-consume
/// operation.
#[derive(Debug, Default)]
pub struct Buffer {
    inner: BytesMut,
}

impl Buffer {
    /// Create an empty buffer with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an empty buffer whose capacity is at least `n`, rounded up to
    /// the next power-of-two multiple of the initial capacity.
    pub fn with_capacity(n: usize) -> Self {
        Buffer {
            inner: BytesMut::with_capacity(Self::next_capacity(n)),
        }
    }

    /// Geometric growth policy: start at 1024, double until the requested
    /// size fits.
    fn next_capacity(requested: usize) -> usize {
        let mut cap = INITIAL_CAPACITY;
        while cap < requested {
            cap *= 2;
        }
        cap
    }

    /// Ensure spare capacity for at least `n` more bytes, reallocating (and
    /// copying) if necessary. Never shrinks.
    pub fn reserve(&mut self, n: usize) {
        if self.inner.capacity() - self.inner.len() < n {
            let needed = self.inner.len() + n;
            let target = Self::next_capacity(needed);
            self.inner.reserve(target - self.inner.len());
        }
    }

    /// Extend the buffer's logical length to `n`, reserving and
    /// zero-filling as needed. Never shrinks an already-larger buffer.
    pub fn resize(&mut self, n: usize) {
        if n > self.inner.len() {
            let extra = n - self.inner.len();
            self.reserve(extra);
            self.inner.put_bytes(0, extra);
        }
    }

    /// Append bytes to the end of the buffer.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.inner.extend_from_slice(data);
    }

    /// Remove the first `k` bytes, shifting the remainder to the front. If
    /// `k >= len()` the buffer becomes empty. `O(len() - k)`.
    pub fn consume(&mut self, k: usize) {
        if k >= self.inner.len() {
            self.inner.clear();
        } else {
            let _ = self.inner.split_to(k);
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Borrow the underlying `BytesMut` mutably, e.g. so a socket read can
    /// write directly into its spare capacity via `BufMut`.
    pub fn inner_mut(&mut self) -> &mut BytesMut {
        &mut self.inner
    }

    /// Grow the buffer so that `[at, at + n)` is valid, and return that
    /// region as a writable slice. Used by the streaming parser's
    /// `prepare_buffer` to hand the caller a span to read socket bytes into.
    pub fn prepare_region(&mut self, at: usize, n: usize) -> &mut [u8] {
        self.resize(at + n);
        &mut self.inner[at..at + n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_floor_capacity() {
        let buf = Buffer::new();
        assert_eq!(buf.capacity(), INITIAL_CAPACITY);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn capacity_doubles_to_fit() {
        let buf = Buffer::with_capacity(1025);
        assert_eq!(buf.capacity(), INITIAL_CAPACITY * 2);
    }

    #[test]
    fn consume_partial_shifts_remaining_bytes() {
        let mut buf = Buffer::new();
        buf.extend_from_slice(b"hello world");
        buf.consume(6);
        assert_eq!(buf.data(), b"world");
    }

    #[test]
    fn consume_past_len_clears() {
        let mut buf = Buffer::new();
        buf.extend_from_slice(b"hi");
        buf.consume(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn resize_zero_fills_growth() {
        let mut buf = Buffer::new();
        buf.extend_from_slice(b"ab");
        buf.resize(5);
        assert_eq!(buf.data(), &[b'a', b'b', 0, 0, 0]);
    }
}
