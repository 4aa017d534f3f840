//! Crash simulation.
//!
//! A crash is a [`Database`] dropped without `close()`: nothing more is
//! written, unsynced store state is lost, and the next open recovers from
//! the journal. On top of that the harness can damage the newest journal
//! file the way an interrupted write would.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let harness = CrashHarness::new();
//! let db = harness.open();
//! // ... work without commit ...
//! let db = harness.restart(db);
//! assert_eq!(db.recovery_report().rolled_back.len(), 1);
//! ```

use crate::fixtures::TestEnv;
use crate::store::DocumentStore;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use strata_core::journal::{file_name, list_files};
use strata_core::{Config, CoreResult, Database};
use strata_storage::{FileDevice, LogDevice};

/// Opens, crashes and reopens a database in one scratch directory.
#[derive(Debug, Default)]
pub struct CrashHarness {
    env: TestEnv,
}

impl CrashHarness {
    /// Creates a harness over a fresh [`TestEnv`].
    pub fn new() -> Self {
        Self { env: TestEnv::new() }
    }

    /// Creates a harness with an adjusted configuration.
    pub fn with_config(f: impl FnOnce(Config) -> Config) -> Self {
        Self {
            env: TestEnv::with_config(f),
        }
    }

    /// Returns the underlying environment.
    pub fn env(&self) -> &TestEnv {
        &self.env
    }

    /// Opens the database, panicking on failure.
    pub fn open(&self) -> Database<DocumentStore> {
        self.env.open()
    }

    /// Opens the database.
    ///
    /// # Errors
    ///
    /// Returns whatever recovery returns.
    pub fn try_open(&self) -> CoreResult<Database<DocumentStore>> {
        self.env.try_open()
    }

    /// Crashes after making every logged record durable.
    pub fn crash(db: Database<DocumentStore>) {
        db.flush_journal().expect("Failed to flush journal");
        drop(db);
    }

    /// Crashes with the journal buffer unflushed.
    pub fn crash_unflushed(db: Database<DocumentStore>) {
        drop(db);
    }

    /// Crashes and reopens.
    pub fn restart(&self, db: Database<DocumentStore>) -> Database<DocumentStore> {
        Self::crash(db);
        self.open()
    }

    /// Closes cleanly and reopens.
    pub fn close_and_reopen(&self, db: Database<DocumentStore>) -> Database<DocumentStore> {
        db.close().expect("Failed to close database");
        drop(db);
        self.open()
    }

    /// Returns the path of the newest journal file.
    pub fn latest_journal(&self) -> PathBuf {
        let dir = self.env.config().resolved_journal_dir();
        let file = *list_files(&dir)
            .expect("Failed to list journal files")
            .last()
            .expect("No journal file");
        dir.join(file_name(file))
    }

    /// Returns the length of the newest journal file.
    pub fn journal_len(&self) -> u64 {
        FileDevice::open_read_only(&self.latest_journal())
            .and_then(|d| d.len())
            .expect("Failed to stat journal")
    }

    /// Cuts `bytes` off the end of the newest journal file, as a write
    /// interrupted mid-record would. Returns the new length.
    pub fn tear_tail(&self, bytes: u64) -> u64 {
        let mut device = FileDevice::open(&self.latest_journal()).expect("Failed to open journal");
        let len = device.len().expect("Failed to stat journal");
        let new_len = len.saturating_sub(bytes);
        device.truncate(new_len).expect("Failed to truncate journal");
        device.sync().expect("Failed to sync journal");
        new_len
    }

    /// Flips every bit of the byte at `offset` in the newest journal file.
    pub fn corrupt_byte(&self, offset: u64) {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.latest_journal())
            .expect("Failed to open journal");
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
        file.read_exact(&mut byte).expect("Failed to read byte");
        byte[0] ^= 0xFF;
        file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
        file.write_all(&byte).expect("Failed to write byte");
        file.sync_all().expect("Failed to sync journal");
    }
}
