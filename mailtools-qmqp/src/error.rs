//! Error types for the QMQP codec, client and server.

use std::{io, net::SocketAddr};

use mailtools_common::RecipientError;
use thiserror::Error;

/// Wire data that breaks the netstring grammar.
#[derive(Debug, Error)]
pub enum NetstringError {
    #[error("Invalid netstring: {0}")]
    InvalidNetstring(String),

    #[error("Netstring content is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A decoded message carried an unusable recipient address.
    #[error("Invalid recipient in message: {0}")]
    Recipient(#[from] RecipientError),
}

impl NetstringError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidNetstring(reason.into())
    }
}

/// A failure while delivering to one server. Collected into a failed
/// [`Delivery`](crate::client::Delivery), never returned on its own.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unable to connect to {server}: {source}")]
    ConnectFailure {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("Transfer to {server} failed: {source}")]
    Transfer {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid server {0:?}")]
    InvalidServer(String),

    #[error("No servers configured")]
    NoServers,

    /// The message's recipients could not be read for encoding.
    #[error("Unable to encode message: {0}")]
    Encode(#[from] RecipientError),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unable to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = NetstringError> = std::result::Result<T, E>;
