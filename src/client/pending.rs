//! The client's pending-request table: `msgid -> promise`
//! (`SPEC_FULL.md` §3, §4.10).
//!
//! An entry lives from the moment `Client::async_request` allocates a
//! msgid until a response arrives (removed and fulfilled) or the read loop
//! observes a terminal transport error (removed and failed, see
//! `fail_all`). The table itself is a `std::sync::Mutex`-guarded map held
//! only for the O(1) insert/remove; the `oneshot` channel each entry wraps
//! owns its own synchronization once the mutex is released, matching the
//! "promise owns its own synchronization" design in `SPEC_FULL.md` §5.

use std::collections::HashMap;
use std::sync::Mutex;

use rmpv::Value;
use tokio::sync::oneshot;

/// What a completed request resolves to: the server's result on success,
/// or its error payload, both as raw `Value`s so the caller's
/// `ResponseFuture<R>` can decode `R` only on the success path.
pub type RawOutcome = std::result::Result<Value, Value>;

/// A pending entry's channel payload. `Err(reason)` is used only for the
/// failure cascade (`SPEC_FULL.md` §4.10: "a terminal read error fails all
/// outstanding promises with that error"), since the underlying transport
/// error itself isn't `Clone`.
pub type PendingResult = std::result::Result<RawOutcome, String>;

#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<u32, oneshot::Sender<PendingResult>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending entry for `msgid`. Returns the sender back as
    /// `Err` if `msgid` is already outstanding, so the caller can retry the
    /// same promise with a freshly allocated id per (I4)/§4.10 step 3.
    pub fn try_insert(
        &self,
        msgid: u32,
        tx: oneshot::Sender<PendingResult>,
    ) -> std::result::Result<(), oneshot::Sender<PendingResult>> {
        let mut table = self.inner.lock().expect("pending table mutex poisoned");
        if table.contains_key(&msgid) {
            return Err(tx);
        }
        table.insert(msgid, tx);
        Ok(())
    }

    /// Remove and return the promise for `msgid`, if one is outstanding.
    pub fn remove(&self, msgid: u32) -> Option<oneshot::Sender<PendingResult>> {
        self.inner
            .lock()
            .expect("pending table mutex poisoned")
            .remove(&msgid)
    }

    /// Fail every outstanding entry with `reason` and clear the table. Used
    /// when the client's read loop observes a terminal transport error, so
    /// no caller hangs waiting on a response that will never arrive.
    pub fn fail_all(&self, reason: &str) {
        let entries: Vec<_> = self
            .inner
            .lock()
            .expect("pending table mutex poisoned")
            .drain()
            .collect();
        for (_msgid, tx) in entries {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_msgid_insert_is_rejected() {
        let table = PendingTable::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        assert!(table.try_insert(1, tx1).is_ok());
        assert!(table.try_insert(1, tx2).is_err());
    }

    #[tokio::test]
    async fn fail_all_resolves_every_outstanding_promise() {
        let table = PendingTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.try_insert(1, tx1).unwrap();
        table.try_insert(2, tx2).unwrap();

        table.fail_all("connection reset");

        assert_eq!(rx1.await.unwrap().unwrap_err(), "connection reset");
        assert_eq!(rx2.await.unwrap().unwrap_err(), "connection reset");
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn remove_then_fulfill_delivers_to_waiter() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        table.try_insert(5, tx).unwrap();

        let tx = table.remove(5).expect("entry should be present");
        tx.send(Ok(Ok(Value::from("abc")))).unwrap();

        assert_eq!(rx.await.unwrap().unwrap().unwrap(), Value::from("abc"));
    }
}
