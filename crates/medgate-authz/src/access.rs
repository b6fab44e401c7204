//! Read-access decisions for report content.

use medgate_core::{AuthTicket, Report, Role, Timestamp};

use crate::error::AuthzError;
use crate::principal::Caller;
use crate::ticket::TicketStatus;

/// Why a read was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadGround {
    /// The caller is the clinic that issued the report.
    Issuer,
    /// The caller is the patient who owns the report.
    Owner,
    /// The caller holds a valid ticket expiring at the given time.
    Ticket { expiry: Timestamp },
}

/// Outcome of a read-access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadDecision {
    Allow(ReadGround),
    Deny(String),
    /// A matching ticket exists but has expired.
    Expired { expiry: Timestamp },
}

impl ReadDecision {
    pub fn into_result(self, report: &Report) -> crate::Result<ReadGround> {
        match self {
            ReadDecision::Allow(ground) => Ok(ground),
            ReadDecision::Deny(reason) => Err(AuthzError::Denied(reason)),
            ReadDecision::Expired { expiry } => Err(AuthzError::Expired {
                report_id: report.report_id.to_string(),
                expiry,
            }),
        }
    }
}

/// Decide whether `caller` may read `report`'s content at `now`.
///
/// `ticket` is the ticket stored at
/// `(report.patient_hash, caller.hash, report.report_id)`, if any. A ticket
/// that does not match that tuple is ignored.
pub fn decide_read(
    caller: &Caller,
    report: &Report,
    ticket: Option<&AuthTicket>,
    now: Timestamp,
) -> ReadDecision {
    match caller.role() {
        Role::Clinic => match caller.clinic_id() {
            Some(clinic) if clinic == report.clinic_id => ReadDecision::Allow(ReadGround::Issuer),
            _ => ReadDecision::Deny("clinic did not issue this report".into()),
        },
        Role::Patient => {
            if caller.hash() == report.patient_hash {
                ReadDecision::Allow(ReadGround::Owner)
            } else {
                ReadDecision::Deny("report belongs to another patient".into())
            }
        }
        Role::Insurer => {
            let Some(ticket) = ticket.filter(|t| {
                t.patient_hash == report.patient_hash
                    && t.target_hash == caller.hash()
                    && t.report_id == report.report_id
            }) else {
                return ReadDecision::Deny("no access ticket for this report".into());
            };

            match TicketStatus::of(ticket, now) {
                TicketStatus::Active => ReadDecision::Allow(ReadGround::Ticket {
                    expiry: ticket.expiry,
                }),
                TicketStatus::Expired => ReadDecision::Expired {
                    expiry: ticket.expiry,
                },
            }
        }
    }
}
