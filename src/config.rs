//! Configuration surface: TOML documents deserialized into the option
//! structs that parameterize servers and clients (`SPEC_FULL.md` §6).
//!
//! This is the external-collaborator config loader carried as ambient
//! stack: it uses `serde` + `toml` the way `sova-org-Sova`'s
//! `config/types.rs` does (one struct per concern, `#[serde(default)]` on
//! every field so a partial document is valid), and surfaces failures
//! through this crate's own `Error::InvalidConfigValue` /
//! `Error::ConfigParseError` rather than a bespoke config error type.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_streaming_min_buf_size() -> usize {
    1024
}

fn default_datagram_buf_size() -> usize {
    crate::transport::udp::DEFAULT_DATAGRAM_BUF_SIZE
}

fn default_zstd_level() -> i32 {
    crate::codec::zstd_codec::DEFAULT_LEVEL
}

fn default_num_threads() -> usize {
    1
}

fn default_sync_request_timeout_ms() -> u32 {
    3000
}

/// Compression selection, shared by every acceptor/connector config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CompressionConfig {
    None,
    Zstd {
        #[serde(default = "default_zstd_level")]
        zstd_compression_level: i32,
    },
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig::None
    }
}

impl CompressionConfig {
    /// Validate the configured level, if any, against the linked zstd
    /// library's supported range.
    pub fn validate(&self) -> Result<()> {
        match self {
            CompressionConfig::None => Ok(()),
            CompressionConfig::Zstd {
                zstd_compression_level,
            } => crate::codec::zstd_codec::validate_level(*zstd_compression_level),
        }
    }

    pub fn streaming_factory(&self) -> Result<std::sync::Arc<dyn crate::codec::StreamingCodecFactory>> {
        self.validate()?;
        Ok(match self {
            CompressionConfig::None => {
                std::sync::Arc::new(crate::codec::identity::IdentityCodecFactory)
            }
            CompressionConfig::Zstd {
                zstd_compression_level,
            } => std::sync::Arc::new(crate::codec::zstd_codec::ZstdCodecFactory::new(
                *zstd_compression_level,
            )?),
        })
    }

    pub fn non_streaming_codec(&self) -> Result<std::sync::Arc<dyn crate::codec::NonStreamingCodec>> {
        self.validate()?;
        Ok(match self {
            CompressionConfig::None => std::sync::Arc::new(crate::codec::identity::IdentityCodec),
            CompressionConfig::Zstd {
                zstd_compression_level,
            } => std::sync::Arc::new(crate::codec::zstd_codec::ZstdCodec::new(
                *zstd_compression_level,
            )?),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TcpAcceptorConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default = "default_streaming_min_buf_size")]
    pub streaming_min_buf_size: usize,
}

impl TcpAcceptorConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        self.compression.validate()?;
        if self.streaming_min_buf_size == 0 {
            return Err(Error::InvalidConfigValue(
                "streaming_min_buf_size must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

pub type TcpConnectorConfig = TcpAcceptorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UdpAcceptorConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default = "default_datagram_buf_size")]
    pub datagram_buf_size: usize,
}

impl UdpAcceptorConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        self.compression.validate()?;
        if self.datagram_buf_size == 0 {
            return Err(Error::InvalidConfigValue(
                "datagram_buf_size must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

pub type UdpConnectorConfig = UdpAcceptorConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default)]
    pub tcp_acceptors: Vec<TcpAcceptorConfig>,
    #[serde(default)]
    pub udp_acceptors: Vec<UdpAcceptorConfig>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(Error::InvalidConfigValue(
                "server.num_threads must be nonzero".into(),
            ));
        }
        for acceptor in &self.tcp_acceptors {
            acceptor.validate()?;
        }
        for acceptor in &self.udp_acceptors {
            acceptor.validate()?;
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            Error::InvalidConfigValue(format!(
                "could not read {}: {source}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_sync_request_timeout_ms")]
    pub sync_request_timeout_ms: u32,
    pub connector_type: ConnectorType,
    #[serde(default)]
    pub tcp_connector: Option<TcpConnectorConfig>,
    #[serde(default)]
    pub udp_connector: Option<UdpConnectorConfig>,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(Error::InvalidConfigValue(
                "client.num_threads must be nonzero".into(),
            ));
        }
        if self.sync_request_timeout_ms == 0 {
            return Err(Error::InvalidConfigValue(
                "sync_request_timeout_ms must be nonzero".into(),
            ));
        }
        match self.connector_type {
            ConnectorType::Tcp => {
                let cfg = self.tcp_connector.as_ref().ok_or_else(|| {
                    Error::InvalidConfigValue(
                        "connector_type = tcp requires a [tcp_connector] table".into(),
                    )
                })?;
                cfg.validate()?;
            }
            ConnectorType::Udp => {
                let cfg = self.udp_connector.as_ref().ok_or_else(|| {
                    Error::InvalidConfigValue(
                        "connector_type = udp requires a [udp_connector] table".into(),
                    )
                })?;
                cfg.validate()?;
            }
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            Error::InvalidConfigValue(format!(
                "could not read {}: {source}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_server_config() {
        let toml = r#"
            num_threads = 4

            [[tcp_acceptors]]
            host = "0.0.0.0"
            port = 18800
        "#;
        let config = ServerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.tcp_acceptors.len(), 1);
        assert_eq!(config.tcp_acceptors[0].streaming_min_buf_size, 1024);
        assert_eq!(config.tcp_acceptors[0].compression, CompressionConfig::None);
    }

    #[test]
    fn parses_zstd_compression() {
        let toml = r#"
            [[tcp_acceptors]]
            host = "0.0.0.0"
            port = 18800

            [tcp_acceptors.compression]
            type = "zstd"
            zstd_compression_level = 9
        "#;
        let config = ServerConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.tcp_acceptors[0].compression,
            CompressionConfig::Zstd {
                zstd_compression_level: 9
            }
        );
    }

    #[test]
    fn rejects_out_of_range_compression_level() {
        let toml = r#"
            [[tcp_acceptors]]
            host = "0.0.0.0"
            port = 18800

            [tcp_acceptors.compression]
            type = "zstd"
            zstd_compression_level = 999
        "#;
        assert!(ServerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ServerConfig::from_toml_str("not valid [[[ toml").unwrap_err();
        assert!(matches!(err, Error::ConfigParseError(_)));
    }

    #[test]
    fn client_requires_matching_connector_table() {
        let toml = r#"
            connector_type = "tcp"
        "#;
        let err = ClientConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue(_)));
    }

    #[test]
    fn client_with_tcp_connector_validates() {
        let toml = r#"
            connector_type = "tcp"

            [tcp_connector]
            host = "127.0.0.1"
            port = 18800
        "#;
        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.sync_request_timeout_ms, 3000);
    }
}
