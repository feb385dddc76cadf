//! Error types for the wire codec.

use thiserror::Error;

/// Errors produced while encoding or decoding a datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("clock has {entries} entries (max {max})", max = emesh_core::MAX_NODES)]
    OversizedClock { entries: usize },

    #[error("short header: {len} bytes (need {need})", need = crate::codec::HEADER_LEN)]
    ShortHeader { len: usize },

    #[error("truncated message: clock section needs {expected} bytes, datagram has {actual}")]
    TruncatedMessage { expected: usize, actual: usize },

    #[error("invalid identity field: {0}")]
    InvalidIdentity(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
