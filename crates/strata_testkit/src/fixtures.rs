//! Test fixtures and journal helpers.

use crate::store::{DocumentStore, Fragment};
use std::path::Path;
use strata_core::journal::list_files;
use strata_core::{CollectionId, Config, CoreError, CoreResult, Database, JournalReader, Loggable, Lsn};
use tempfile::TempDir;

/// Collection used by the scenario tests.
pub const TEST_COLLECTION: CollectionId = CollectionId(1);

/// Returns the database path of a test document.
#[must_use]
pub fn test_path(name: &str) -> String {
    format!("/db/test/{name}")
}

/// `<element1>text1</element1>`
#[must_use]
pub fn sample_xml() -> Fragment {
    Fragment::element("element1", [Fragment::text("text1")])
}

/// A larger document with nested elements and mixed content.
#[must_use]
pub fn nested_xml() -> Fragment {
    Fragment::element(
        "catalog",
        [
            Fragment::element(
                "book",
                [
                    Fragment::element("title", [Fragment::text("Journaling")]),
                    Fragment::element("year", [Fragment::text("2004")]),
                ],
            ),
            Fragment::text("separator"),
            Fragment::element("book", [Fragment::element("title", [Fragment::text("Recovery")])]),
        ],
    )
}

/// Stand-in for a binary resource.
#[must_use]
pub fn license_bytes() -> Vec<u8> {
    let mut bytes = b"Permission is hereby granted, free of charge\n".repeat(40);
    bytes.extend((0u8..=255).collect::<Vec<_>>());
    bytes
}

/// Reads every record from journal file `file`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is corrupt.
pub fn read_journal(dir: &Path, file: u32) -> CoreResult<Vec<(Lsn, Loggable)>> {
    JournalReader::open(dir, file)?.collect()
}

/// Reads every record from the newest journal file in `dir`.
///
/// # Errors
///
/// Returns an error if there is no journal file or it is corrupt.
pub fn read_latest_journal(dir: &Path) -> CoreResult<Vec<Loggable>> {
    let file = list_files(dir)?
        .last()
        .copied()
        .ok_or_else(|| CoreError::invalid_operation(format!("no journal in {}", dir.display())))?;
    Ok(read_journal(dir, file)?.into_iter().map(|(_, r)| r).collect())
}

/// A scratch data directory with a journal that rotates on every
/// checkpoint.
pub struct TestEnv {
    dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates an environment with `journal_size_min = 0`.
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    /// Creates an environment and lets `f` adjust the configuration.
    pub fn with_config(f: impl FnOnce(Config) -> Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = f(Config::new(dir.path()).journal_size_min(0));
        Self { dir, config }
    }

    /// Returns the data directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the store and database, running recovery.
    ///
    /// # Errors
    ///
    /// Returns whatever store loading or recovery returns.
    pub fn try_open(&self) -> CoreResult<Database<DocumentStore>> {
        let store = DocumentStore::open(self.path())?;
        Database::open(self.config.clone(), store)
    }

    /// Opens the store and database, panicking on failure.
    pub fn open(&self) -> Database<DocumentStore> {
        self.try_open().expect("Failed to open database")
    }

    /// Returns the journal file numbers present.
    pub fn journal_files(&self) -> Vec<u32> {
        list_files(&self.config.resolved_journal_dir()).expect("Failed to list journal files")
    }

    /// Returns the records of the newest journal file.
    pub fn records(&self) -> Vec<Loggable> {
        read_latest_journal(&self.config.resolved_journal_dir()).expect("Failed to read journal")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnv")
            .field("path", &self.dir.path())
            .finish_non_exhaustive()
    }
}

/// Runs `f` with a freshly opened database that is closed afterwards.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database<DocumentStore>) -> R,
{
    let env = TestEnv::new();
    let db = env.open();
    let result = f(&db);
    db.close().expect("Failed to close database");
    result
}
