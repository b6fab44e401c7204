//! # Medgate Authz
//!
//! The authorization rules of medgate, as pure functions over documents.
//!
//! ## Overview
//!
//! Nothing in this crate reads or writes the ledger. The engine loads
//! documents, asks this crate whether a transition or read is allowed, and
//! persists the result. Keeping the rules pure makes every invariant
//! testable without a store.
//!
//! ## Key Concepts
//!
//! - **Caller**: a resolved principal (identity digest, role, clinic attribute)
//! - **Ticket**: valid while `now <= expiry`; an expired ticket is reported
//!   distinctly from the absence of one
//! - **Request workflow**: `PENDING → APPROVED | REJECTED`, exactly once
//! - **Read decision**: issuing clinic, owning patient, or ticket holder
//!
//! ## Usage
//!
//! ```rust
//! use medgate_authz::{decide_read, Caller, ReadDecision};
//! use medgate_core::{IdentityHash, Report, ReportId, Role};
//!
//! let report = Report::new(
//!     ReportId::new("R1").unwrap(),
//!     IdentityHash::of("patient-1"),
//!     "clinic-a",
//!     "{}",
//!     0,
//! );
//!
//! let owner = Caller::new("patient-1", Role::Patient);
//! assert!(matches!(decide_read(&owner, &report, None, 10), ReadDecision::Allow(_)));
//!
//! let stranger = Caller::new("insurer-9", Role::Insurer);
//! assert!(matches!(decide_read(&stranger, &report, None, 10), ReadDecision::Deny(_)));
//! ```

pub mod access;
pub mod error;
pub mod policy;
pub mod principal;
pub mod ticket;
pub mod workflow;

pub use access::{decide_read, ReadDecision, ReadGround};
pub use error::{AuthzError, Result};
pub use policy::{check_expiry, require_owner, require_role};
pub use principal::Caller;
pub use ticket::{filter_tickets, TicketListing, TicketStatus, TicketView};
pub use workflow::{decide_request, ticket_for_approval, transition, Decision};
