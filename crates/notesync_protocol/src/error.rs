//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding persisted records.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Encoding a record to CBOR failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding a record from CBOR failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A record decoded but violates a structural rule.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl ProtocolError {
    /// Creates an invalid-record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }
}
