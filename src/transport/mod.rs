//! The transport layer: acceptors, sessions (server-side peer handles), and
//! connectors (client-side peer handles) for TCP and UDP.
//!
//! A TCP session splits into a writer task, fed through a channel so that
//! writes from concurrently-executing method handlers still land on the
//! wire in submission order (I2), and a reader half owned exclusively by
//! the loop that calls it, which is what stands in for the "strand" of the
//! original design (see `SPEC_FULL.md` §3, §9): there's no separate
//! strand object because the reader's owning task already serializes every
//! touch of the parser.

pub mod tcp;
pub mod udp;

use std::net::SocketAddr;

/// Opaque identifier for a live session, used by the dispatcher's session
/// set and by interned weak references in spawned tasks (see
/// `dispatch::server`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// A decoded message together with where it came from, as handed to the
/// dispatcher by a session's read loop.
#[derive(Debug)]
pub struct Inbound {
    pub session: SessionId,
    pub peer: SocketAddr,
    pub data: bytes::Bytes,
}
