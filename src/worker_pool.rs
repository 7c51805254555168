//! Fixed-size worker pool draining a single shared event loop.
//!
//! This wraps a tokio multi-threaded `Runtime` behind a thin owning type
//! that exposes exactly the surface the rest of the crate needs (`start`,
//! `stop`, `post`, `on_error`) rather than a hand-rolled thread pool and
//! task queue. Per-session ordering is enforced by the owning-task
//! discipline in `transport`, not by how many workers happen to be
//! running.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// A one-shot-per-fault handler, invoked from whichever task observed a
/// worker-fatal error.
pub type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Owns the tokio runtime all sessions and dispatch work execute on.
pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: tokio::runtime::Handle,
    started: AtomicBool,
    on_error: Mutex<Option<ErrorHandler>>,
}

impl WorkerPool {
    /// Build a pool of `num_threads` OS threads sharing one event loop.
    /// `num_threads` below 1 is treated as 1.
    pub fn new(num_threads: usize) -> std::io::Result<Arc<Self>> {
        let threads = num_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Arc::new(WorkerPool {
            runtime: Mutex::new(Some(runtime)),
            handle,
            started: AtomicBool::new(false),
            on_error: Mutex::new(None),
        }))
    }

    /// Idempotent: the runtime is already running from `new`, so this just
    /// flips the `started` flag that `post` checks.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        tracing::info!("worker pool starting");
    }

    /// Idempotent: shuts the runtime down, waiting briefly for outstanding
    /// tasks to observe cancellation. Calling `stop` twice is a no-op.
    pub fn stop(&self) {
        if let Some(runtime) = self.runtime.lock().expect("worker pool mutex poisoned").take() {
            tracing::info!("worker pool stopping");
            runtime.shutdown_timeout(std::time::Duration::from_secs(5));
        }
        self.started.store(false, Ordering::SeqCst);
    }

    /// Install the one-shot-per-fault handler. A later call replaces the
    /// previous handler; only the most recently installed one runs.
    pub fn on_error(&self, handler: ErrorHandler) {
        *self.on_error.lock().expect("worker pool mutex poisoned") = Some(handler);
    }

    /// Run `handler` on the error path for `task_name`, if one is
    /// installed. After it runs the task that failed is simply gone; the
    /// rest of the pool's worker threads are unaffected since tokio does
    /// not tie a panicking task to a dedicated OS thread.
    pub fn report_error(&self, task_name: &str) {
        if let Some(handler) = self.on_error.lock().expect("worker pool mutex poisoned").as_ref() {
            handler(task_name);
        }
    }

    /// Enqueue a future to run on any worker thread. Rejects cleanly (no
    /// panic) once the pool has been stopped, satisfying invariant (I5).
    pub fn post<F>(&self, fut: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.started.load(Ordering::SeqCst) {
            tracing::warn!("post() called before worker pool was started; dropping task");
            return None;
        }
        if self.runtime.lock().expect("worker pool mutex poisoned").is_none() {
            tracing::warn!("post() called after worker pool was stopped; dropping task");
            return None;
        }
        Some(self.handle.spawn(fut))
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.handle.clone()
    }
}
