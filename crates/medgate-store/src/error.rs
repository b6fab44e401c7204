//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A batch expectation did not hold; nothing was written.
    #[error("conflict on {key}: {reason}")]
    Conflict { key: String, reason: String },

    /// Document encoding or decoding failed.
    #[error("document error: {0}")]
    Document(#[from] medgate_core::CoreError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The backend cannot serve requests (poisoned lock, failed worker).
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
