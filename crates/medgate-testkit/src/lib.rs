//! # Medgate Testkit
//!
//! Testing utilities for medgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an engine harness on a fixed clock and recording sink,
//!   named parties for each role, and a fault-injecting ledger
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use medgate_testkit::fixtures::{clinic, patient, Harness};
//!
//! # tokio_test_block(async {
//! let h = Harness::new();
//! let doc = clinic("doc-1", "clinic-a");
//! let pat = patient("A123456789");
//!
//! h.engine
//!     .create_report(&doc.ctx(), "R1", &pat.party_ref(), "{}")
//!     .await
//!     .unwrap();
//! assert_eq!(h.engine.read_report_content(&pat.ctx(), "R1").await.unwrap(), "{}");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use medgate_testkit::generators::{lifetime, report_id};
//!
//! proptest! {
//!     #[test]
//!     fn grant_then_read(id in report_id(), secs in lifetime()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{clinic, insurer, patient, FaultyLedger, Harness, Party, TestEngine, DAY, EPOCH};
pub use generators::DecisionStep;
