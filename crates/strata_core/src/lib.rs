//! # Strata Core
//!
//! Write-ahead journal and crash recovery for the Strata document store.
//!
//! This crate provides:
//! - The journal: checksummed, length-framed records in numbered files,
//!   with buffered appends, rotation at checkpoints and a torn-tail-tolerant
//!   reader
//! - Transaction boundaries: start, commit and abort records, with the
//!   protocol that every transaction ends in at most one of them
//! - Recovery: analysis, redo and undo over the log since the last
//!   checkpoint, applied to any storage layer that implements [`RecoveryTarget`]
//! - A [`Database`] facade that runs recovery on open and checkpoints on
//!   close
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{Config, Database};
//!
//! let db = Database::open(Config::new("data"), store)?;
//! let mut txn = db.begin()?;
//! txn.journal(&record)?;
//! txn.commit()?;
//! db.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
pub mod journal;
pub mod recovery;
pub mod transaction;
mod types;

pub use config::{
    Config, DEFAULT_BUFFER_SIZE, DEFAULT_JOURNAL_SIZE_LIMIT, DEFAULT_JOURNAL_SIZE_MIN,
};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use journal::{EntryType, JournalManager, JournalReader, Loggable};
pub use recovery::{RecoveryManager, RecoveryReport, RecoveryTarget};
pub use transaction::{TransactionManager, Txn, TxnState};
pub use types::{CollectionId, DocId, Lsn, Node, NodeId, PageNum, TxnId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
