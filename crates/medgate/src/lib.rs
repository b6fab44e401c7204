//! # Medgate
//!
//! Authorization engine for medical test reports shared between three
//! mutually distrusting roles: clinics issue reports, patients own them,
//! insurers read them only with a patient's time-bounded permission.
//!
//! ## Overview
//!
//! The engine keeps three kinds of documents in a ledger:
//!
//! - **Report**: immutable test result, created once by a clinic
//! - **AuthTicket**: a capability letting one party read one report until
//!   an expiry time
//! - **AccessRequest**: an insurer's request for a ticket, approved or
//!   rejected exactly once by the owning patient
//!
//! Callers are resolved per invocation by an [`IdentityResolver`]; time comes
//! from a [`Clock`]; committed state changes go to an [`EventSink`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medgate::{AttributeResolver, CallContext, Engine, EngineConfig, SystemClock, TracingSink};
//! use medgate::core::PartyRef;
//! use medgate::store::SqliteLedger;
//!
//! async fn example() -> medgate::Result<()> {
//!     let ledger = SqliteLedger::open("medgate.db")?;
//!     let engine = Engine::new(
//!         ledger,
//!         AttributeResolver::default(),
//!         SystemClock,
//!         TracingSink,
//!         EngineConfig::default(),
//!     );
//!
//!     let clinic = CallContext::new()
//!         .with("enrollmentId", "doctor-7")
//!         .with("role", "clinic")
//!         .with("clinicId", "clinic-a");
//!     engine
//!         .create_report(&clinic, "R1", &PartyRef::id("A123456789"), r#"{"hb":13.5}"#)
//!         .await?;
//!
//!     let patient = CallContext::new()
//!         .with("enrollmentId", "A123456789")
//!         .with("role", "patient");
//!     let payload = engine.read_report_content(&patient, "R1").await?;
//!     println!("{payload}");
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Every failure is an [`EngineError`]. [`EngineError::kind`] classifies it
//! as one of the [`ErrorKind`] values a transport maps to its status codes.
//!
//! ## Re-exports
//!
//! - `medgate::core` - Documents, identifiers, keys
//! - `medgate::store` - Ledger trait and backends
//! - `medgate::authz` - Authorization rules

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod views;

pub use medgate_authz as authz;
pub use medgate_core as core;
pub use medgate_store as store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AttributeNames, EngineConfig, MAX_REQUEST_ID_PREFIX_LEN};
pub use engine::Engine;
pub use error::{EngineError, ErrorKind, IdentityError, Result};
pub use events::{BroadcastSink, EventSink, LedgerEvent, NullSink, RecordingSink, TracingSink};
pub use identity::{AttributeResolver, CallContext, IdentityResolver};
pub use views::{AuthorizedReport, MetadataFilter};

pub use medgate_authz::{TicketListing, TicketView};
pub use medgate_core::{
    AccessRequest, AuthTicket, IdentityHash, PartyRef, Report, ReportId, ReportMeta, RequestId,
    RequestStatus, Role, Timestamp,
};
