//! # Medgate Core
//!
//! Pure data model for the medgate authorization layer: identity digests,
//! the three ledger documents, and the composite key scheme they are
//! stored under.
//!
//! This crate contains no I/O, no storage, no policy. Access rules live in
//! `medgate-authz`; persistence lives in `medgate-store`.
//!
//! ## Key Types
//!
//! - [`IdentityHash`] - One-way digest of an identity string (BLAKE3)
//! - [`Report`] - An immutable medical test report issued by a clinic
//! - [`AuthTicket`] - A time-bounded capability for one (grantee, report) pair
//! - [`AccessRequest`] - An insurer-initiated request awaiting the patient's decision
//! - [`LedgerKey`] - Ordered-tuple key encoding supporting prefix scans
//!
//! ## Documents
//!
//! Every document serializes to JSON with camelCase field names and a
//! `docType` discriminator. See the [`document`] module.

pub mod crypto;
pub mod document;
pub mod error;
pub mod keys;
pub mod types;
pub mod validation;

pub use crypto::{IdentityHash, PartyRef};
pub use document::{
    fields, AccessRequest, AuthTicket, DocType, Document, IndexTerm, Report, ReportMeta,
    RequestStatus,
};
pub use error::CoreError;
pub use keys::{LedgerKey, Namespace, KEY_SEPARATOR};
pub use types::{ReportId, RequestId, Role, Timestamp};
pub use validation::{validate_identifier, MAX_IDENTIFIER_LEN, validate_payload, validate_reason};
