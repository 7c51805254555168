//! A MessagePack-RPC framework: symmetric client and server endpoints that
//! exchange request/response/notification messages over TCP or UDP,
//! optionally with zstd compression on the wire (see `SPEC_FULL.md`).
//!
//! Applications register named methods with typed signatures on a
//! [`server::Server`]; a [`client::Client`] invokes them either
//! asynchronously (`async_request`, `call`) or fire-and-forget
//! (`notify`).
//!
//! ## A synchronous echo request
//!
//! ```rust,no_run
//! use msgpack_rpc::client::ClientBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::tcp("127.0.0.1:18800").await?;
//! let echoed: String = client
//!     .call("echo", vec![rmpv::Value::from("hello")])
//!     .await?;
//! assert_eq!(echoed, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## A server with one registered method
//!
//! ```rust,no_run
//! use msgpack_rpc::config::{ServerConfig, TcpAcceptorConfig};
//! use msgpack_rpc::server::executor::handler1;
//! use msgpack_rpc::server::ServerBuilder;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig {
//!     num_threads: 4,
//!     tcp_acceptors: vec![TcpAcceptorConfig {
//!         host: "0.0.0.0".to_string(),
//!         port: 18800,
//!         compression: Default::default(),
//!         streaming_min_buf_size: 1024,
//!     }],
//!     udp_acceptors: vec![],
//! };
//!
//! let server = ServerBuilder::new(config)?
//!     .register("echo", handler1(|s: String| async move { Ok::<_, String>(s) }))
//!     .build()
//!     .await?;
//!
//! Arc::new(server).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod parser;
pub mod server;
pub mod transport;
pub mod worker_pool;


pub use buffer::SharedBinary;
pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use server::{Server, ServerBuilder};
