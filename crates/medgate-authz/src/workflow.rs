//! The access-request state machine.
//!
//! ```text
//!            approve
//!   PENDING ─────────▶ APPROVED
//!      │
//!      │ reject
//!      ▼
//!   REJECTED
//! ```
//!
//! Both outcomes are terminal. Deciding a request twice fails with
//! [`AuthzError::InvalidTransition`].

use medgate_core::{AccessRequest, AuthTicket, RequestStatus, Role, Timestamp};

use crate::error::{AuthzError, Result};
use crate::policy::{require_owner, require_role};
use crate::principal::Caller;

/// A patient's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub const fn target(&self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

/// Apply a decision to a status.
pub fn transition(current: RequestStatus, decision: Decision) -> Result<RequestStatus> {
    match current {
        RequestStatus::Pending => Ok(decision.target()),
        from => Err(AuthzError::InvalidTransition {
            from,
            to: decision.target(),
        }),
    }
}

/// Check that `caller` may decide `request` and return the decided request.
///
/// The caller must be a patient and must own the request. Role and
/// ownership are checked before the state, so a stranger learns nothing
/// about a request's status.
pub fn decide_request(
    request: &AccessRequest,
    caller: &Caller,
    decision: Decision,
) -> Result<AccessRequest> {
    require_role(caller, Role::Patient)?;
    require_owner(caller, &request.patient_hash, request.request_id.as_str())?;

    let status = transition(request.status, decision)?;
    Ok(AccessRequest {
        status,
        ..request.clone()
    })
}

/// The ticket an approved request produces.
pub fn ticket_for_approval(request: &AccessRequest, now: Timestamp) -> AuthTicket {
    AuthTicket::new(
        request.patient_hash,
        request.requester_hash,
        request.report_id.clone(),
        now,
        request.expiry,
    )
}
