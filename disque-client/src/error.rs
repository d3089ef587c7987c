//! # Client Errors
//!
//! Every layer returns `ClientError` to its caller. Nothing here retries.

use thiserror::Error;

/// Result type for the Disque client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the Disque client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No configured endpoint yielded a usable connection.
    #[error("connection error: no usable endpoint ({attempts} tried)")]
    Connection {
        attempts: usize,
        #[source]
        source: Option<Box<ClientError>>,
    },
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Broker returned an error reply.
    #[error("server error: {0}")]
    Server(String),
    /// Reply shape did not match what the command returns.
    #[error("unexpected reply: expected {expected}, found {found}")]
    Decode { expected: &'static str, found: String },
    /// Endpoint pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Endpoint pool was closed.
    #[error("connection pool closed")]
    PoolClosed,
    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    pub(crate) fn decode(expected: &'static str, found: impl Into<String>) -> Self {
        ClientError::Decode {
            expected,
            found: found.into(),
        }
    }

    /// True when the connection that produced this error must not be reused.
    pub(crate) fn is_fatal_to_connection(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Protocol(_))
    }
}
