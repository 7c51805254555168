//! The RPC server: registered methods, a set of TCP/UDP acceptors, and the
//! worker pool every accepted session's dispatch work runs on
//! (`SPEC_FULL.md` §4.7–§4.9).

pub mod dispatch;
pub mod executor;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::transport::tcp::{TcpAcceptor, TcpSession};
use crate::transport::udp::UdpAcceptor;
use crate::worker_pool::WorkerPool;
use dispatch::Registry;
use executor::Executor;

/// Opaque identifier for a live TCP session, used by the session set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

/// Builds a [`Server`]: register methods, then bind every acceptor named
/// in the config.
pub struct ServerBuilder {
    registry: Registry,
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(ServerBuilder {
            registry: HashMap::new(),
            config,
        })
    }

    /// Register an executor (built via [`executor::handler0`]..
    /// [`executor::handler4`]) under `name`. Registering the same name
    /// twice replaces the previous executor.
    pub fn register(mut self, name: impl Into<String>, executor: Box<dyn Executor>) -> Self {
        self.registry.insert(name.into(), executor);
        self
    }

    /// Bind every configured acceptor and return a runnable [`Server`].
    #[tracing::instrument(skip(self))]
    pub async fn build(self) -> Result<Server> {
        let pool = WorkerPool::new(self.config.num_threads)
            .map_err(|source| crate::error::Error::UnexpectedError(format!(
                "failed to start worker pool: {source}"
            )))?;

        let mut tcp_acceptors = Vec::with_capacity(self.config.tcp_acceptors.len());
        for cfg in &self.config.tcp_acceptors {
            let factory = cfg.compression.streaming_factory()?;
            tcp_acceptors.push(
                TcpAcceptor::bind(cfg.addr(), factory, cfg.streaming_min_buf_size).await?,
            );
        }

        let mut udp_acceptors = Vec::with_capacity(self.config.udp_acceptors.len());
        for cfg in &self.config.udp_acceptors {
            let codec = cfg.compression.non_streaming_codec()?;
            udp_acceptors.push(UdpAcceptor::bind(cfg.addr(), codec, cfg.datagram_buf_size).await?);
        }

        Ok(Server {
            registry: Arc::new(self.registry),
            pool,
            tcp_acceptors,
            udp_acceptors,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(0),
        })
    }
}

/// A running (once `run()` is called) RPC server: bound acceptors, the
/// method registry, and the worker pool all dispatch work executes on.
pub struct Server {
    registry: Arc<Registry>,
    pool: Arc<WorkerPool>,
    tcp_acceptors: Vec<TcpAcceptor>,
    udp_acceptors: Vec<UdpAcceptor>,
    sessions: Arc<Mutex<HashMap<SessionId, TcpSession>>>,
    next_session_id: AtomicU64,
}

impl Server {
    /// The bound local address of the `n`th TCP acceptor, useful in tests
    /// that bind to port 0 and need the OS-assigned port.
    pub fn tcp_local_addr(&self, n: usize) -> std::io::Result<std::net::SocketAddr> {
        self.tcp_acceptors[n].local_addr()
    }

    pub fn udp_local_addr(&self, n: usize) -> std::io::Result<std::net::SocketAddr> {
        self.udp_acceptors[n].local_addr()
    }

    /// Run every acceptor's accept loop concurrently. Each keeps exactly
    /// one `accept()` outstanding (§4.7): a session is registered, a read
    /// loop spawned for it, and the next accept is issued immediately.
    /// Returns once every acceptor loop exits (normally only on a bind
    /// error surfacing through one of them, since `TcpListener::accept`
    /// otherwise runs forever).
    #[tracing::instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.pool.start();

        let mut tasks = Vec::new();
        for index in 0..self.tcp_acceptors.len() {
            let this = self.clone();
            tasks.push(tokio::spawn(async move { this.run_tcp_acceptor(index).await }));
        }
        for index in 0..self.udp_acceptors.len() {
            let this = self.clone();
            tasks.push(tokio::spawn(async move { this.run_udp_acceptor(index).await }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    async fn run_tcp_acceptor(&self, index: usize) {
        loop {
            match self.tcp_acceptors[index].accept().await {
                Ok((session, reader)) => {
                    let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
                    self.sessions
                        .lock()
                        .expect("session set mutex poisoned")
                        .insert(id, session.clone());

                    let registry = self.registry.clone();
                    let pool = self.pool.clone();
                    let sessions = self.sessions.clone();
                    tokio::spawn(async move {
                        dispatch::run_tcp_session(session, reader, registry, pool).await;
                        sessions.lock().expect("session set mutex poisoned").remove(&id);
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed; re-arming");
                }
            }
        }
    }

    async fn run_udp_acceptor(&self, index: usize) {
        loop {
            match self.udp_acceptors[index].accept().await {
                Ok(pseudo_session) => {
                    let registry = self.registry.clone();
                    let pool = self.pool.clone();
                    tokio::spawn(async move {
                        dispatch::run_udp_pseudo_session(pseudo_session, registry, pool).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed; re-arming");
                }
            }
        }
    }

    /// Number of sessions currently tracked as live TCP peers.
    pub fn live_session_count(&self) -> usize {
        self.sessions.lock().expect("session set mutex poisoned").len()
    }

    pub fn stop(&self) {
        self.pool.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TcpAcceptorConfig;
    use crate::server::executor::handler1;
    use rmpv::Value;

    fn local_config() -> ServerConfig {
        ServerConfig {
            num_threads: 2,
            tcp_acceptors: vec![TcpAcceptorConfig {
                host: "127.0.0.1".into(),
                port: 0,
                compression: crate::config::CompressionConfig::None,
                streaming_min_buf_size: 1024,
            }],
            udp_acceptors: vec![],
        }
    }

    #[tokio::test]
    async fn echo_request_round_trips_over_tcp() {
        let server = ServerBuilder::new(local_config())
            .unwrap()
            .register("echo", handler1(|s: String| async move { Ok::<_, String>(s) }))
            .build()
            .await
            .unwrap();
        let server = Arc::new(server);
        let addr = server.tcp_local_addr(0).unwrap();
        let running = tokio::spawn(server.clone().run());

        let factory: Arc<dyn crate::codec::StreamingCodecFactory> =
            Arc::new(crate::codec::identity::IdentityCodecFactory);
        let connector = crate::transport::tcp::TcpConnector::new(addr.to_string(), factory, 1024);
        let (session, mut reader) = connector.connect().await.unwrap();

        let request = crate::message::pack_request(0, "echo", vec![Value::from("abc")]);
        session.write_message(request).await.unwrap();
        let raw = reader.read_message().await.unwrap();
        match crate::message::Message::decode(raw).unwrap() {
            crate::message::Message::Response { result, error, .. } => {
                assert_eq!(error, Value::Nil);
                assert_eq!(result, Value::from("abc"));
            }
            other => panic!("expected Response, got {other:?}"),
        }

        server.stop();
        running.abort();
    }
}
