//! # Medgate Store
//!
//! The ledger abstraction medgate runs on. Provides a trait-based interface
//! for key-value persistence with composite-key prefix scans and rich
//! queries over indexed document fields, with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Ledger`] - The async trait for all storage operations
//! - [`SqliteLedger`] - SQLite-based persistent storage
//! - [`MemoryLedger`] - In-memory storage for tests and embedding
//! - [`WriteBatch`] - Writes plus the read-set they were computed from
//! - [`Selector`] - A rich query: document kind plus field equalities
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medgate_core::{IdentityHash, Report, ReportId};
//! use medgate_store::{Ledger, LedgerExt, MemoryLedger, Selector, WriteBatch};
//!
//! async fn example() -> medgate_store::Result<()> {
//!     let ledger = MemoryLedger::new();
//!
//!     let report = Report::new(
//!         ReportId::new("R1").unwrap(),
//!         IdentityHash::of("patient"),
//!         "clinic-a",
//!         "{}",
//!         1_700_000_000,
//!     );
//!
//!     // Create-if-absent as one atomic unit
//!     let mut batch = WriteBatch::new();
//!     batch.expect_absent(medgate_core::Document::key(&report));
//!     batch.put_document(&report)?;
//!     ledger.commit(batch).await?;
//!
//!     // Rich query by indexed field
//!     let selector = Selector::reports().with("clinicId", "clinic-a");
//!     let found = ledger.query(&selector).await?;
//!     assert_eq!(found.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic commits**: a batch's expectations and writes are applied as one
//!   unit; a failed expectation returns [`StoreError::Conflict`] and writes
//!   nothing.
//! - **Synchronous indexing**: the `(docType, field, value) → keys` index is
//!   updated in the same unit as the document write it reflects.
//! - **Key order**: scans and queries return entries in key order.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{Expectation, Ledger, LedgerEntry, LedgerExt, Selector, WriteBatch, WriteOp};
