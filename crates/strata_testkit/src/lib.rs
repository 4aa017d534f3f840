//! # Strata Testkit
//!
//! Test utilities for Strata.
//!
//! This crate provides:
//! - [`DocumentStore`], a reference storage layer that journals its
//!   mutations and implements the recovery callbacks
//! - Crash simulation through [`CrashHarness`]
//! - Partial-order assertions over journal contents
//! - Fixtures and proptest generators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! let harness = CrashHarness::new();
//! let db = harness.open();
//! let mut txn = db.begin()?;
//! db.storage().store_xml(&txn, TEST_COLLECTION, &test_path("a.xml"), &sample_xml())?;
//! txn.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod expected;
pub mod fixtures;
pub mod generators;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::expected::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::store::*;
}

pub use crash::CrashHarness;
pub use expected::{assert_partial_ordered, match_partial_ordered, Expected};
pub use fixtures::*;
pub use store::{page_of, DocumentStore, Fragment};
