//! The client correlator (`SPEC_FULL.md` §4.10): allocates message IDs,
//! tracks outstanding requests in a [`pending::PendingTable`], and
//! completes their [`future::ResponseFuture`]s as responses arrive off a
//! single dedicated read task.

pub mod builder;
pub mod future;
pub mod pending;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use rmpv::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use builder::ClientBuilder;
pub use future::ResponseFuture;

use crate::error::{Error, Result};
use crate::message::{pack_notification, pack_request, Message};
use crate::transport::tcp::{TcpSession, TcpSessionReader};
use crate::transport::udp::UdpConnector;
use pending::{PendingResult, PendingTable};

/// The write side of whichever transport the client was built with. Both
/// variants are cheaply cloneable so requests issued concurrently from
/// different tasks can all write through the same connector.
#[derive(Clone)]
pub(crate) enum Writer {
    Tcp(TcpSession),
    Udp(Arc<UdpConnector>),
}

impl Writer {
    async fn write(&self, data: Bytes) -> Result<()> {
        match self {
            Writer::Tcp(session) => session.write_message(data).await,
            Writer::Udp(connector) => connector.write_message(data).await,
        }
    }
}

/// A MessagePack-RPC client: one outbound connection (TCP) or bound socket
/// (UDP), a msgid allocator, and the pending-request table its background
/// read task completes.
pub struct Client {
    writer: Writer,
    pending: Arc<PendingTable>,
    next_msgid: AtomicU32,
    sync_timeout: std::time::Duration,
    read_task: JoinHandle<()>,
}

impl Client {
    /// Build a `Client` around an already-connected transport and spawn its
    /// dedicated read task.
    pub(crate) fn spawn(
        writer: Writer,
        source: builder::ReadSource,
        sync_timeout: std::time::Duration,
    ) -> Self {
        let pending = Arc::new(PendingTable::new());
        let read_task = match source {
            builder::ReadSource::Tcp(reader) => {
                tokio::spawn(run_tcp_read_loop(reader, pending.clone()))
            }
            builder::ReadSource::Udp(connector) => {
                tokio::spawn(run_udp_read_loop(connector, pending.clone()))
            }
        };
        Client {
            writer,
            pending,
            next_msgid: AtomicU32::new(0),
            sync_timeout,
            read_task,
        }
    }

    /// Allocate a fresh msgid and register `tx` against it, retrying with
    /// the next id if the allocated one is still outstanding (possible only
    /// after wrapping around a full u32 of concurrently in-flight
    /// requests).
    fn allocate_msgid(&self, mut tx: oneshot::Sender<PendingResult>) -> u32 {
        loop {
            let msgid = self.next_msgid.fetch_add(1, Ordering::Relaxed);
            match self.pending.try_insert(msgid, tx) {
                Ok(()) => return msgid,
                Err(returned_tx) => tx = returned_tx,
            }
        }
    }

    /// Issue a request and return a future yielding the decoded result
    /// (§8: "for every async_request, exactly one of {success, server
    /// error, transport error, timeout} completes its future").
    #[tracing::instrument(skip(self, params))]
    pub async fn async_request<R>(&self, method: &str, params: Vec<Value>) -> Result<ResponseFuture<R>>
    where
        R: serde::de::DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let msgid = self.allocate_msgid(tx);

        let raw = pack_request(msgid, method, params);
        if let Err(e) = self.writer.write(raw).await {
            self.pending.remove(msgid);
            return Err(e);
        }
        Ok(ResponseFuture::new(msgid, rx))
    }

    /// Issue a request and block until the response arrives or the
    /// configured `sync_request_timeout_ms` elapses. On timeout, removes
    /// the pending entry so a later response is dropped instead of hanging
    /// around for a msgid that will never be reused.
    #[tracing::instrument(skip(self, params))]
    pub async fn call<R>(&self, method: &str, params: Vec<Value>) -> Result<R>
    where
        R: serde::de::DeserializeOwned + Send + 'static,
    {
        let fut = self.async_request(method, params).await?;
        let msgid = fut.msgid();
        match fut.get_with_timeout(self.sync_timeout).await {
            Err(Error::ClientTimeout) => {
                self.pending.remove(msgid);
                Err(Error::ClientTimeout)
            }
            other => other,
        }
    }

    /// Fire a notification: packed and written, no promise, no response
    /// expected.
    #[tracing::instrument(skip(self, params))]
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> Result<()> {
        let raw = pack_notification(method, params);
        self.writer.write(raw).await
    }

    /// Abort the background read task. Outstanding requests observe a
    /// transport error rather than hanging.
    pub fn shutdown(&self) {
        self.read_task.abort();
        self.pending.fail_all("client shut down");
    }
}

/// Drive the read loop for a TCP-backed client: one outstanding read at a
/// time, immediately re-armed after each message, per §4.10.
async fn run_tcp_read_loop(mut reader: TcpSessionReader, pending: Arc<PendingTable>) {
    loop {
        match reader.read_message().await {
            Ok(raw) => {
                if let Err(reason) = dispatch_response(raw, &pending) {
                    tracing::warn!(error = %reason, "fatal error decoding server message; stopping read loop");
                    pending.fail_all(&reason);
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "client read loop terminating");
                pending.fail_all(&e.to_string());
                break;
            }
        }
    }
}

async fn run_udp_read_loop(connector: Arc<UdpConnector>, pending: Arc<PendingTable>) {
    loop {
        match connector.read_message().await {
            Ok(raw) => {
                if let Err(reason) = dispatch_response(raw, &pending) {
                    tracing::warn!(error = %reason, "fatal error decoding server datagram; stopping read loop");
                    pending.fail_all(&reason);
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "client read loop terminating");
                pending.fail_all(&e.to_string());
                break;
            }
        }
    }
}

/// Decode one message off the wire and, if it's a response, fulfill the
/// matching pending entry. Returns `Err` for anything that should be fatal
/// to the read loop (malformed bytes, or a kind the client never expects
/// on its ingress, per §7's `InvalidMessage` row).
fn dispatch_response(raw: Bytes, pending: &PendingTable) -> std::result::Result<(), String> {
    match Message::decode(raw) {
        Ok(Message::Response {
            msgid,
            error,
            result,
            ..
        }) => {
            if let Some(tx) = pending.remove(msgid) {
                let outcome = if matches!(error, Value::Nil) {
                    Ok(result)
                } else {
                    Err(error)
                };
                let _ = tx.send(Ok(outcome));
            } else {
                tracing::debug!(msgid, "dropping response for unknown or already-completed msgid");
            }
            Ok(())
        }
        Ok(Message::Request { method, .. }) => Err(format!(
            "received a request for method {method:?} on a client ingress socket"
        )),
        Ok(Message::Notification { method, .. }) => {
            tracing::debug!(method, "ignoring unsolicited notification from server");
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}
