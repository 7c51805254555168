//! Factory for creating clients: a handful of named async constructors
//! (`tcp`, `udp`, `from_config`) rather than a builder type with setters,
//! since connecting is itself the only configurable step once a
//! [`crate::config::ClientConfig`] is in hand.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Client, Writer};
use crate::config::{ClientConfig, ConnectorType};
use crate::error::Result;
use crate::transport::tcp::TcpConnector;
use crate::transport::udp::UdpConnector;

/// Factory for connecting a [`Client`] over TCP or UDP.
pub struct ClientBuilder;

impl ClientBuilder {
    /// Connect over TCP with the identity codec and the default sync
    /// request timeout (3000ms).
    pub async fn tcp(addr: impl Into<String>) -> Result<Client> {
        Self::tcp_with_timeout(addr, Duration::from_millis(3000)).await
    }

    pub async fn tcp_with_timeout(addr: impl Into<String>, timeout: Duration) -> Result<Client> {
        let factory = Arc::new(crate::codec::identity::IdentityCodecFactory);
        let connector = TcpConnector::new(addr, factory, 1024);
        let (session, reader) = connector.connect().await?;
        Ok(Client::spawn(Writer::Tcp(session), reader.into(), timeout))
    }

    /// Connect over UDP with the identity codec and the default sync
    /// request timeout.
    pub async fn udp(addr: impl tokio::net::ToSocketAddrs + std::fmt::Debug) -> Result<Client> {
        Self::udp_with_timeout(addr, Duration::from_millis(3000)).await
    }

    pub async fn udp_with_timeout(
        addr: impl tokio::net::ToSocketAddrs + std::fmt::Debug,
        timeout: Duration,
    ) -> Result<Client> {
        let codec = Arc::new(crate::codec::identity::IdentityCodec);
        let connector = Arc::new(
            UdpConnector::connect(addr, codec, crate::transport::udp::DEFAULT_DATAGRAM_BUF_SIZE)
                .await?,
        );
        Ok(Client::spawn(
            Writer::Udp(connector.clone()),
            ReadSource::Udp(connector),
            timeout,
        ))
    }

    /// Connect using a fully validated [`ClientConfig`] (`SPEC_FULL.md`
    /// §6), selecting TCP or UDP per `connector_type` and applying the
    /// configured compression and timeout.
    #[tracing::instrument(skip(config))]
    pub async fn from_config(config: &ClientConfig) -> Result<Client> {
        config.validate()?;
        let timeout = Duration::from_millis(config.sync_request_timeout_ms as u64);

        match config.connector_type {
            ConnectorType::Tcp => {
                let cfg = config.tcp_connector.as_ref().expect("validated above");
                let factory = cfg.compression.streaming_factory()?;
                let connector =
                    TcpConnector::new(cfg.addr(), factory, cfg.streaming_min_buf_size);
                let (session, reader) = connector.connect().await?;
                Ok(Client::spawn(Writer::Tcp(session), reader.into(), timeout))
            }
            ConnectorType::Udp => {
                let cfg = config.udp_connector.as_ref().expect("validated above");
                let codec = cfg.compression.non_streaming_codec()?;
                let connector =
                    Arc::new(UdpConnector::connect(cfg.addr(), codec, cfg.datagram_buf_size).await?);
                Ok(Client::spawn(
                    Writer::Udp(connector.clone()),
                    ReadSource::Udp(connector),
                    timeout,
                ))
            }
        }
    }
}

/// Which half of the transport the background read task owns.
pub enum ReadSource {
    Tcp(crate::transport::tcp::TcpSessionReader),
    Udp(Arc<UdpConnector>),
}

impl From<crate::transport::tcp::TcpSessionReader> for ReadSource {
    fn from(reader: crate::transport::tcp::TcpSessionReader) -> Self {
        ReadSource::Tcp(reader)
    }
}
