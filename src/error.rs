//! Crate-wide error type.
//!
//! One variant per fault kind recognized anywhere in the stack, from buffer
//! allocation through wire parsing to client-side timeouts. Handlers match on
//! the variant rather than a string, and every variant that arises from
//! validating untrusted bytes carries the offending slice so a caller can log
//! it.

use bytes::Bytes;
use thiserror::Error;

/// Errors raised by the framing, transport, and dispatch layers.
#[derive(Debug, Error)]
pub enum Error {
    /// The streaming parser encountered a byte sequence that is not valid
    /// MessagePack.
    #[error("parse error: {reason}")]
    ParseError {
        reason: String,
        data: Option<Bytes>,
    },

    /// A fully-parsed MessagePack value did not have the shape a
    /// request/response/notification requires.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        reason: String,
        data: Option<Bytes>,
    },

    /// The peer closed the connection cleanly.
    #[error("end of file")]
    Eof,

    /// Binding a listening socket failed.
    #[error("failed to listen on {addr}: {source}")]
    FailedToListen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("failed to accept connection: {source}")]
    FailedToAccept {
        #[source]
        source: std::io::Error,
    },

    /// Resolving a connector's target address failed.
    #[error("failed to resolve {addr}: {source}")]
    FailedToResolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Establishing an outbound connection failed.
    #[error("failed to connect to {addr}: {source}")]
    FailedToConnect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A socket read failed for a reason other than clean EOF.
    #[error("failed to read: {source}")]
    FailedToRead {
        #[source]
        source: std::io::Error,
    },

    /// A socket write failed.
    #[error("failed to write: {source}")]
    FailedToWrite {
        #[source]
        source: std::io::Error,
    },

    /// A request named a method the server has no executor for.
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    /// A promise/future pair was used in a way its single-fulfillment
    /// contract forbids (e.g. completed twice, or given two handlers).
    #[error("invalid future use: {0}")]
    InvalidFutureUse(String),

    /// A configuration value failed validation (out of range, wrong type for
    /// its field).
    #[error("invalid config value: {0}")]
    InvalidConfigValue(String),

    /// A configuration document could not be parsed as TOML.
    #[error("config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    /// A synchronous request did not receive a response within its deadline.
    #[error("client timeout waiting for response")]
    ClientTimeout,

    /// The server's response carried a non-nil error payload.
    #[error("server error: {0}")]
    ServerError(String),

    /// Catch-all for failures in a third-party library (zstd, etc.) that do
    /// not map cleanly onto another variant.
    #[error("unexpected error: {0}")]
    UnexpectedError(String),
}

impl Error {
    pub fn parse_error(reason: impl Into<String>) -> Self {
        Error::ParseError {
            reason: reason.into(),
            data: None,
        }
    }

    pub fn parse_error_with_data(reason: impl Into<String>, data: Bytes) -> Self {
        Error::ParseError {
            reason: reason.into(),
            data: Some(data),
        }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Error::InvalidMessage {
            reason: reason.into(),
            data: None,
        }
    }

    pub fn invalid_message_with_data(reason: impl Into<String>, data: Bytes) -> Self {
        Error::InvalidMessage {
            reason: reason.into(),
            data: Some(data),
        }
    }

    /// Whether this error is fatal to the session it arose on (as opposed to
    /// one that is reported and the session continues, e.g. `FailedToAccept`
    /// on the acceptor's listening socket).
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::ParseError { .. }
                | Error::InvalidMessage { .. }
                | Error::Eof
                | Error::FailedToRead { .. }
                | Error::FailedToWrite { .. }
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
