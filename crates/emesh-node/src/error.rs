//! Error types for the node layer.

use emesh_protocol::CodecError;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode message: {0}")]
    Encode(#[source] CodecError),

    #[error("malformed datagram from {from}: {error}")]
    Decode {
        from: SocketAddr,
        #[source]
        error: CodecError,
    },
}

/// Errors returned by node operations.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("invalid peer address {addr:?}: {reason}")]
    InvalidPeer { addr: String, reason: String },

    #[error("invalid key {0:?}: keys must be non-empty and must not contain ':'")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
