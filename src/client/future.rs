//! `ResponseFuture<R>`: the typed future a request resolves to
//! (`SPEC_FULL.md` §4.11).
//!
//! Wraps the untyped `oneshot::Receiver<PendingResult>` the pending table
//! hands back at request time. Completion maps to exactly one of: decoded
//! `R` on success, `Error::ServerError` for a non-nil error payload, or a
//! transport/timeout error, matching the "exactly one of {success,
//! server error, transport error, timeout}" property in `SPEC_FULL.md` §8.
//! Offers both synchronous (`get`) and callback-style (`then`) consumption.

use std::io;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::client::pending::PendingResult;
use crate::error::{Error, Result};

/// A future representing one outstanding request's eventual response,
/// decoded as `R`.
pub struct ResponseFuture<R> {
    msgid: u32,
    rx: oneshot::Receiver<PendingResult>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ResponseFuture<R> {
    pub(crate) fn new(msgid: u32, rx: oneshot::Receiver<PendingResult>) -> Self {
        ResponseFuture {
            msgid,
            rx,
            _marker: PhantomData,
        }
    }

    /// The message ID this future's request was allocated, so a caller that
    /// times out waiting on it can remove the matching pending-table entry.
    pub(crate) fn msgid(&self) -> u32 {
        self.msgid
    }
}

fn transport_dropped() -> Error {
    Error::FailedToRead {
        source: io::Error::new(
            io::ErrorKind::BrokenPipe,
            "client read loop exited before a response arrived",
        ),
    }
}

impl<R: DeserializeOwned + Send + 'static> ResponseFuture<R> {
    /// Block (asynchronously) until the response arrives, and decode it.
    pub async fn get(self) -> Result<R> {
        match self.rx.await {
            Err(_) => Err(transport_dropped()),
            Ok(Err(reason)) => Err(Error::FailedToRead {
                source: io::Error::new(io::ErrorKind::Other, reason),
            }),
            Ok(Ok(Err(error_value))) => Err(Error::ServerError(
                error_value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{error_value:?}")),
            )),
            Ok(Ok(Ok(result_value))) => rmpv::ext::from_value(result_value)
                .map_err(|e| Error::InvalidMessage {
                    reason: format!("result did not decode as the expected type: {e}"),
                    data: None,
                }),
        }
    }

    /// Block with a deadline, converting a timeout into `Error::ClientTimeout`.
    /// The underlying read is not cancelled on timeout (`SPEC_FULL.md`
    /// §4.10, §5): `Client::call` is responsible for removing this
    /// future's pending-table entry once this returns `ClientTimeout`, so a
    /// late response is logged and dropped instead of matching a slot a
    /// later request has since reused.
    pub async fn get_with_timeout(self, timeout: std::time::Duration) -> Result<R> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::ClientTimeout),
        }
    }

    /// Callback-style consumption: spawns a task that awaits the response
    /// and invokes `on_ok` or `on_err` accordingly.
    pub fn then<OnOk, OnErr>(self, on_ok: OnOk, on_err: OnErr)
    where
        OnOk: FnOnce(R) + Send + 'static,
        OnErr: FnOnce(Error) + Send + 'static,
    {
        tokio::spawn(async move {
            match self.get().await {
                Ok(value) => on_ok(value),
                Err(e) => on_err(e),
            }
        });
    }
}
