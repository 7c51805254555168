//! Minimal echo server: registers one `echo(s: String) -> String` method
//! and serves it over TCP with the identity codec.

use argh::FromArgs;
use msgpack_rpc::config::{CompressionConfig, ServerConfig, TcpAcceptorConfig};
use msgpack_rpc::server::executor::handler1;
use msgpack_rpc::server::ServerBuilder;
use std::sync::Arc;

#[derive(FromArgs)]
/// msgpack-rpc echo server demo
struct Args {
    /// address to listen on
    #[argh(option, default = "\"127.0.0.1:18800\".to_string()")]
    addr: String,

    /// zstd compression level; omit for no compression
    #[argh(option)]
    zstd_level: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Args = argh::from_env();
    let (host, port) = args
        .addr
        .rsplit_once(':')
        .expect("addr must be host:port");

    let compression = match args.zstd_level {
        Some(level) => CompressionConfig::Zstd {
            zstd_compression_level: level,
        },
        None => CompressionConfig::None,
    };

    let config = ServerConfig {
        num_threads: 2,
        tcp_acceptors: vec![TcpAcceptorConfig {
            host: host.to_string(),
            port: port.parse()?,
            compression,
            streaming_min_buf_size: 1024,
        }],
        udp_acceptors: vec![],
    };

    let server = ServerBuilder::new(config)?
        .register("echo", handler1(|s: String| async move { Ok::<_, String>(s) }))
        .build()
        .await?;

    tracing::info!(addr = %args.addr, "echo server listening");
    Arc::new(server).run().await?;
    Ok(())
}
