//! UDP helper: each datagram is one complete, already-framed message, so
//! there is no streaming parser involved, just a non-streaming codec and a
//! receive buffer sized to the configured MTU.
//!
//! A "UDP session" is a one-shot pseudo-session tied to a single inbound
//! datagram (`SPEC_FULL.md` §4.6, §9): `read_message()` hands back the
//! datagram that created it exactly once and fails on every call after, a
//! constraint enforced here by an `AtomicBool` flip rather than left to
//! documentation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::codec::NonStreamingCodec;
use crate::error::{Error, Result};

pub const DEFAULT_DATAGRAM_BUF_SIZE: usize = 65527;

/// One inbound datagram, decoded and ready to hand to the dispatcher exactly
/// once.
pub struct UdpSession {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    codec: Arc<dyn NonStreamingCodec>,
    payload: Bytes,
    consumed: AtomicBool,
}

impl UdpSession {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the decoded message this pseudo-session was created from.
    /// Every call after the first fails with `FailedToRead`, matching the
    /// "exactly once" contract of a UDP pseudo-session.
    pub async fn read_message(&self) -> Result<Bytes> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Err(Error::FailedToRead {
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "udp pseudo-session already consumed its one datagram",
                ),
            });
        }
        Ok(self.payload.clone())
    }

    /// Send one datagram back to the peer that sent this one. UDP writes
    /// need no queue: datagrams are independent and unordered by the
    /// transport, and the RPC layer's msgid already handles out-of-order
    /// delivery.
    pub async fn write_message(&self, data: Bytes) -> Result<()> {
        let frame = self.codec.compress(&data)?;
        self.socket
            .send_to(&frame, self.peer)
            .await
            .map_err(|source| Error::FailedToWrite { source })?;
        Ok(())
    }
}

/// Server-side UDP acceptor: loops receiving datagrams from a bound socket,
/// yielding one pseudo-session per datagram.
pub struct UdpAcceptor {
    socket: Arc<UdpSocket>,
    codec: Arc<dyn NonStreamingCodec>,
    buf_size: usize,
}

impl UdpAcceptor {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs + std::fmt::Debug + Clone,
        codec: Arc<dyn NonStreamingCodec>,
        buf_size: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr.clone())
            .await
            .map_err(|source| Error::FailedToListen {
                addr: format!("{addr:?}"),
                source,
            })?;
        Ok(UdpAcceptor {
            socket: Arc::new(socket),
            codec,
            buf_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    #[tracing::instrument(skip(self))]
    pub async fn accept(&self) -> Result<UdpSession> {
        let mut buf = vec![0u8; self.buf_size];
        let (n, peer) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|source| Error::FailedToAccept { source })?;
        buf.truncate(n);
        let payload = self.codec.decompress(&buf)?;
        Ok(UdpSession {
            socket: self.socket.clone(),
            peer,
            codec: self.codec.clone(),
            payload,
            consumed: AtomicBool::new(false),
        })
    }
}

/// Client-side UDP connector: one bound socket, one fixed peer address.
pub struct UdpConnector {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    codec: Arc<dyn NonStreamingCodec>,
    buf_size: usize,
}

impl UdpConnector {
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs + std::fmt::Debug,
        codec: Arc<dyn NonStreamingCodec>,
        buf_size: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| Error::FailedToListen {
                addr: "0.0.0.0:0".to_string(),
                source,
            })?;
        socket
            .connect(&addr)
            .await
            .map_err(|source| Error::FailedToConnect {
                addr: format!("{addr:?}"),
                source,
            })?;
        let peer = socket
            .peer_addr()
            .map_err(|source| Error::FailedToConnect {
                addr: format!("{addr:?}"),
                source,
            })?;
        Ok(UdpConnector {
            socket: Arc::new(socket),
            peer,
            codec,
            buf_size,
        })
    }

    pub async fn write_message(&self, data: Bytes) -> Result<()> {
        let frame = self.codec.compress(&data)?;
        self.socket
            .send(&frame)
            .await
            .map_err(|source| Error::FailedToWrite { source })?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn read_message(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; self.buf_size];
        let n = self
            .socket
            .recv(&mut buf)
            .await
            .map_err(|source| Error::FailedToRead { source })?;
        buf.truncate(n);
        self.codec.decompress(&buf)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identity::IdentityCodec;

    #[tokio::test]
    async fn echoes_one_datagram() {
        let codec: Arc<dyn NonStreamingCodec> = Arc::new(IdentityCodec);
        let acceptor = UdpAcceptor::bind("127.0.0.1:0", codec.clone(), DEFAULT_DATAGRAM_BUF_SIZE)
            .await
            .unwrap();
        let addr = acceptor.local_addr().unwrap();

        let connector = UdpConnector::connect(addr, codec, DEFAULT_DATAGRAM_BUF_SIZE)
            .await
            .unwrap();

        let server_side = tokio::spawn(async move {
            let session = acceptor.accept().await.unwrap();
            let msg = session.read_message().await.unwrap();
            session.write_message(msg).await.unwrap();
        });

        connector
            .write_message(Bytes::from_static(b"ping"))
            .await
            .unwrap();
        let echoed = connector.read_message().await.unwrap();
        assert_eq!(echoed, Bytes::from_static(b"ping"));

        server_side.await.unwrap();
    }

    #[tokio::test]
    async fn pseudo_session_is_single_use() {
        let codec: Arc<dyn NonStreamingCodec> = Arc::new(IdentityCodec);
        let acceptor = UdpAcceptor::bind("127.0.0.1:0", codec.clone(), DEFAULT_DATAGRAM_BUF_SIZE)
            .await
            .unwrap();
        let addr = acceptor.local_addr().unwrap();
        let connector = UdpConnector::connect(addr, codec, DEFAULT_DATAGRAM_BUF_SIZE)
            .await
            .unwrap();

        connector
            .write_message(Bytes::from_static(b"once"))
            .await
            .unwrap();
        let session = acceptor.accept().await.unwrap();
        assert!(session.read_message().await.is_ok());
        assert!(session.read_message().await.is_err());
    }
}
