//! Error types for the authorization rules.

use medgate_core::{RequestStatus, Role, Timestamp};
use thiserror::Error;

/// Errors raised when a rule rejects an action.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Caller's role does not permit the operation.
    #[error("role {actual} may not perform this operation (requires {required})")]
    WrongRole { required: Role, actual: Role },

    /// Caller does not own the document.
    #[error("caller does not own {0}")]
    NotOwner(String),

    /// Access denied for another reason.
    #[error("access denied: {0}")]
    Denied(String),

    /// A ticket exists but is past its expiry.
    #[error("access to {report_id} expired at {expiry}")]
    Expired {
        report_id: String,
        expiry: Timestamp,
    },

    /// An expiry argument is not strictly in the future.
    #[error("expiry {expiry} is not after current time {now}")]
    ExpiryNotInFuture { expiry: Timestamp, now: Timestamp },

    /// An expiry argument exceeds the configured maximum lifetime.
    #[error("requested lifetime of {requested}s exceeds maximum of {max}s")]
    LifetimeTooLong { requested: i64, max: i64 },

    /// The request state machine does not allow this transition.
    #[error("request already handled: cannot move from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
}

/// Result type for authorization rules.
pub type Result<T> = std::result::Result<T, AuthzError>;
