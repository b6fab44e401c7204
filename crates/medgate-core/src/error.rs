//! Error types for medgate core.

use thiserror::Error;

/// Errors raised while constructing or decoding core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {kind}: {reason}")]
    InvalidIdentifier { kind: &'static str, reason: String },

    #[error("invalid identity hash: {0}")]
    InvalidHash(String),

    #[error("unknown role: {0}")]
    InvalidRole(String),

    #[error("invalid key component: {0}")]
    InvalidKeyComponent(String),

    #[error("malformed ledger key: {0}")]
    MalformedKey(String),

    #[error("{field} exceeds maximum length of {max} bytes (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
