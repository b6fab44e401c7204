//! Role gates, ownership checks and expiry argument checks.

use medgate_core::{IdentityHash, Role, Timestamp};

use crate::error::{AuthzError, Result};
use crate::principal::Caller;

/// Require the caller to hold `role`.
pub fn require_role(caller: &Caller, role: Role) -> Result<()> {
    if caller.role() != role {
        return Err(AuthzError::WrongRole {
            required: role,
            actual: caller.role(),
        });
    }
    Ok(())
}

/// Require the caller's identity digest to equal the document owner's.
pub fn require_owner(caller: &Caller, owner: &IdentityHash, what: &str) -> Result<()> {
    if caller.hash() != *owner {
        return Err(AuthzError::NotOwner(what.to_string()));
    }
    Ok(())
}

/// Check an expiry argument: strictly after `now`, and within
/// `max_lifetime` seconds of it when a maximum is configured.
pub fn check_expiry(expiry: Timestamp, now: Timestamp, max_lifetime: Option<i64>) -> Result<()> {
    if expiry <= now {
        return Err(AuthzError::ExpiryNotInFuture { expiry, now });
    }

    if let Some(max) = max_lifetime {
        let requested = expiry.saturating_sub(now);
        if requested > max {
            return Err(AuthzError::LifetimeTooLong { requested, max });
        }
    }

    Ok(())
}
