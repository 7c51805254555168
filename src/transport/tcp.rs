//! TCP stream socket helper: the framing state machine described in
//! `SPEC_FULL.md` §4.5, split into a [`TcpSession`] write handle (cheap to
//! clone, safe to share across the tasks that compute responses
//! concurrently) and a [`TcpSessionReader`] that owns the read side and the
//! streaming parser.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use crate::codec::{StreamingCodecFactory, StreamingCompressor, StreamingParser};
use crate::error::{Error, Result};

/// A write request queued for the session's writer task.
struct WriteJob {
    data: Bytes,
    completion: oneshot::Sender<Result<()>>,
}

/// Cheaply-clonable write handle for one TCP peer. Every clone shares the
/// same underlying writer task and channel, so writes issued from
/// concurrently-running method executors still serialize onto the wire in
/// submission order.
#[derive(Clone)]
pub struct TcpSession {
    peer_addr: SocketAddr,
    write_tx: mpsc::UnboundedSender<WriteJob>,
}

impl TcpSession {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queue `data` for the writer task, which compresses it through the
    /// streaming compressor and writes the resulting frame whole. Resolves
    /// once that write completes (or fails).
    pub async fn write_message(&self, data: Bytes) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.write_tx
            .send(WriteJob {
                data,
                completion: tx,
            })
            .map_err(|_| Error::FailedToWrite {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "writer task has exited"),
            })?;
        rx.await.map_err(|_| Error::FailedToWrite {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "writer task dropped the reply"),
        })?
    }

    /// Half-close the write side, which unblocks the writer task once its
    /// queue drains; subsequent `write_message` calls fail.
    pub fn shutdown(&self) {
        // Dropping the sender is how we signal the writer task to finish up
        // and exit once its queue is drained; there is deliberately no
        // separate shutdown message.
    }
}

/// Owns the read half of a TCP connection and the streaming parser. Reads
/// are only ever issued from whatever single task owns this value, which is
/// what gives invariant (I1) without an explicit lock.
pub struct TcpSessionReader {
    read_half: OwnedReadHalf,
    parser: Box<dyn StreamingParser>,
    min_buf_size: usize,
}

impl TcpSessionReader {
    /// Read the next fully-framed, decompressed message, following the
    /// protocol in `SPEC_FULL.md` §4.5: try to parse what's already
    /// buffered, else read more, opportunistically draining whatever is
    /// immediately available before re-attempting to parse.
    #[tracing::instrument(skip(self), level = "trace")]
    pub async fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if self.parser.parse_next(0)? {
                return Ok(self.parser.get());
            }

            let buf = self.parser.prepare_buffer(self.min_buf_size);
            let n = self.read_half.read(buf).await.map_err(|source| {
                tracing::debug!(error = %source, "tcp read failed");
                Error::FailedToRead { source }
            })?;
            if n == 0 {
                return Err(Error::Eof);
            }
            self.parser.consumed(n);

            loop {
                let probe = self.parser.prepare_buffer(self.min_buf_size);
                match self.read_half.try_read(probe) {
                    Ok(0) => break,
                    Ok(k) => self.parser.consumed(k),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(source) => return Err(Error::FailedToRead { source }),
                }
            }

            if self.parser.parse_next(0)? {
                return Ok(self.parser.get());
            }
        }
    }
}

async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut compressor: Box<dyn StreamingCompressor>,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
) {
    while let Some(job) = rx.recv().await {
        let result = write_one(&mut write_half, compressor.as_mut(), &job.data).await;
        let failed = result.is_err();
        let _ = job.completion.send(result);
        if failed {
            // A failed write means the connection is broken; there is no
            // point draining the rest of the queue onto a dead socket.
            break;
        }
    }
}

async fn write_one(
    write_half: &mut OwnedWriteHalf,
    compressor: &mut dyn StreamingCompressor,
    data: &[u8],
) -> Result<()> {
    let frame = compressor.compress(data)?;
    write_half
        .write_all(&frame)
        .await
        .map_err(|source| Error::FailedToWrite { source })
}

/// Split a connected TCP stream into its write handle and its read-owning
/// half, spawning the writer task that backs the handle.
pub fn split(
    stream: TcpStream,
    codecs: &dyn StreamingCodecFactory,
    min_buf_size: usize,
) -> Result<(TcpSession, TcpSessionReader)> {
    let peer_addr = stream
        .peer_addr()
        .map_err(|source| Error::FailedToAccept { source })?;
    stream.set_nodelay(true).ok();

    let (read_half, write_half) = stream.into_split();
    let (write_tx, write_rx) = mpsc::unbounded_channel();

    let compressor = codecs.new_compressor();
    tokio::spawn(run_writer(write_half, compressor, write_rx));

    let parser = codecs.new_parser();
    let reader = TcpSessionReader {
        read_half,
        parser,
        min_buf_size,
    };
    let session = TcpSession {
        peer_addr,
        write_tx,
    };
    Ok((session, reader))
}

/// Server-side TCP acceptor: binds, listens, and yields one `(TcpSession,
/// TcpSessionReader)` pair per accepted peer. The accept loop in
/// `dispatch::server` keeps exactly one `accept()` outstanding by simply
/// awaiting this in a loop.
pub struct TcpAcceptor {
    listener: TcpListener,
    codecs: Arc<dyn StreamingCodecFactory>,
    min_buf_size: usize,
}

impl TcpAcceptor {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs + std::fmt::Debug + Clone,
        codecs: Arc<dyn StreamingCodecFactory>,
        min_buf_size: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr.clone()).await.map_err(|source| {
            Error::FailedToListen {
                addr: format!("{addr:?}"),
                source,
            }
        })?;
        Ok(TcpAcceptor {
            listener,
            codecs,
            min_buf_size,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[tracing::instrument(skip(self))]
    pub async fn accept(&self) -> Result<(TcpSession, TcpSessionReader)> {
        let (stream, _peer) = self
            .listener
            .accept()
            .await
            .map_err(|source| Error::FailedToAccept { source })?;
        split(stream, self.codecs.as_ref(), self.min_buf_size)
    }
}

/// Client-side TCP connector: establishes one outbound connection.
pub struct TcpConnector {
    addr: String,
    codecs: Arc<dyn StreamingCodecFactory>,
    min_buf_size: usize,
}

impl TcpConnector {
    pub fn new(
        addr: impl Into<String>,
        codecs: Arc<dyn StreamingCodecFactory>,
        min_buf_size: usize,
    ) -> Self {
        TcpConnector {
            addr: addr.into(),
            codecs,
            min_buf_size,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn connect(&self) -> Result<(TcpSession, TcpSessionReader)> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| Error::FailedToConnect {
                addr: self.addr.clone(),
                source,
            })?;
        split(stream, self.codecs.as_ref(), self.min_buf_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identity::IdentityCodecFactory;

    #[tokio::test]
    async fn echoes_a_message_through_a_loopback_pair() {
        let factory: Arc<dyn StreamingCodecFactory> = Arc::new(IdentityCodecFactory);
        let acceptor = TcpAcceptor::bind("127.0.0.1:0", factory.clone(), 1024)
            .await
            .unwrap();
        let addr = acceptor.local_addr().unwrap();

        let connector = TcpConnector::new(addr.to_string(), factory, 1024);

        let server_side = tokio::spawn(async move {
            let (session, mut reader) = acceptor.accept().await.unwrap();
            let msg = reader.read_message().await.unwrap();
            session.write_message(msg).await.unwrap();
        });

        let (client_session, mut client_reader) = connector.connect().await.unwrap();
        client_session
            .write_message(Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let echoed = client_reader.read_message().await.unwrap();
        assert_eq!(echoed, Bytes::from_static(b"hello"));

        server_side.await.unwrap();
    }

    #[tokio::test]
    async fn eof_on_clean_close() {
        let factory: Arc<dyn StreamingCodecFactory> = Arc::new(IdentityCodecFactory);
        let acceptor = TcpAcceptor::bind("127.0.0.1:0", factory.clone(), 1024)
            .await
            .unwrap();
        let addr = acceptor.local_addr().unwrap();
        let connector = TcpConnector::new(addr.to_string(), factory, 1024);

        let server_side = tokio::spawn(async move {
            let (_session, mut reader) = acceptor.accept().await.unwrap();
            let err = reader.read_message().await.unwrap_err();
            assert!(matches!(err, Error::Eof));
        });

        let (client_session, _client_reader) = connector.connect().await.unwrap();
        drop(client_session);
        server_side.await.unwrap();
    }
}
