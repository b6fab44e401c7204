//! Error types for the engine.
//!
//! Every failure an operation can return is an [`EngineError`]; its
//! [`ErrorKind`] is the stable classification a transport maps onto its own
//! status codes.

use std::fmt;

use medgate_authz::AuthzError;
use medgate_core::CoreError;
use medgate_store::StoreError;
use thiserror::Error;

/// Failures resolving the caller of an operation.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The host supplied no value for a required attribute.
    #[error("missing caller attribute: {0}")]
    MissingAttribute(String),

    /// The role attribute is not one of `clinic`, `patient`, `insurer`.
    #[error("unrecognised role: {0}")]
    UnknownRole(String),
}

/// Classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Expired,
    Internal,
}

impl ErrorKind {
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorKind::Expired => "EXPIRED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller could not be resolved.
    #[error("unauthenticated: {0}")]
    Identity(#[from] IdentityError),

    /// An authorization rule rejected the operation.
    #[error("{0}")]
    Authz(#[from] AuthzError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Malformed argument.
    #[error("invalid argument: {0}")]
    Core(#[from] CoreError),

    /// Report not found.
    #[error("report not found: {0}")]
    ReportNotFound(String),

    /// Access request not found.
    #[error("access request not found: {0}")]
    RequestNotFound(String),

    /// Report already exists.
    #[error("report already exists: {0}")]
    ReportExists(String),

    /// Argument is well-formed but inconsistent with stored state.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Denied by the engine itself rather than a rule.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Identity(_) => ErrorKind::Unauthenticated,
            EngineError::Authz(e) => match e {
                AuthzError::WrongRole { .. } | AuthzError::NotOwner(_) | AuthzError::Denied(_) => {
                    ErrorKind::PermissionDenied
                }
                AuthzError::Expired { .. } => ErrorKind::Expired,
                AuthzError::ExpiryNotInFuture { .. } | AuthzError::LifetimeTooLong { .. } => {
                    ErrorKind::InvalidArgument
                }
                AuthzError::InvalidTransition { .. } => ErrorKind::FailedPrecondition,
            },
            // A lost optimistic-concurrency race: the state the check was
            // made against no longer holds.
            EngineError::Store(StoreError::Conflict { .. }) => ErrorKind::FailedPrecondition,
            EngineError::Store(_) => ErrorKind::Internal,
            EngineError::Core(_) | EngineError::InvalidArgument(_) | EngineError::Config(_) => {
                ErrorKind::InvalidArgument
            }
            EngineError::ReportNotFound(_) | EngineError::RequestNotFound(_) => ErrorKind::NotFound,
            EngineError::ReportExists(_) => ErrorKind::AlreadyExists,
            EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
