//! Shared access to the active journal.

use super::dir::JournalDir;
use super::loggable::Loggable;
use super::writer::Journal;
use crate::config::Config;
use crate::error::CoreResult;
use crate::types::{Lsn, TxnId};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Owns the active [`Journal`] behind the append lock.
///
/// Every append, flush, rotation and checkpoint takes the same mutex, so a
/// checkpoint always lands between two complete records and never inside a
/// half-written one.
pub struct JournalManager {
    dir: PathBuf,
    journal: Mutex<Journal>,
    checkpoint_requested: AtomicBool,
}

impl JournalManager {
    /// Resolves and locks the journal directory.
    ///
    /// The journal is not writable until [`JournalManager::initialize`] runs;
    /// before that, recovery reads the files left by the previous run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::JournalLocked`] if another instance owns
    /// the directory, or an I/O error.
    pub fn open(config: &Config) -> CoreResult<Self> {
        let path = config.resolved_journal_dir();
        let dir = JournalDir::open(&path)?;
        let journal = Journal::new(dir, config)?;
        info!(
            dir = %path.display(),
            last_file = ?journal.current_file(),
            "journal directory opened"
        );
        Ok(Self {
            dir: path,
            journal: Mutex::new(journal),
            checkpoint_requested: AtomicBool::new(false),
        })
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn journal_dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the latest journal file: the one recovery reads before
    /// initialization, the active one after.
    #[must_use]
    pub fn last_file(&self) -> Option<u32> {
        self.journal.lock().current_file()
    }

    /// Returns the LSN of the last record written in this run.
    #[must_use]
    pub fn last_lsn(&self) -> Lsn {
        self.journal.lock().last_lsn()
    }

    /// Starts a fresh file so the journal accepts writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn initialize(&self) -> CoreResult<u32> {
        self.journal.lock().switch_files()
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is closed or the write fails.
    pub fn journal(&self, record: &Loggable) -> CoreResult<Lsn> {
        let mut journal = self.journal.lock();
        let lsn = journal.write(record)?;
        if journal.over_size_limit() {
            self.checkpoint_requested.store(true, Ordering::Release);
        }
        Ok(lsn)
    }

    /// Appends a record and flushes it, syncing when the journal syncs on
    /// commit. Used for commit records.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or flush fails.
    pub fn journal_group(&self, record: &Loggable) -> CoreResult<Lsn> {
        let mut journal = self.journal.lock();
        let lsn = journal.write(record)?;
        journal.flush(true, false)?;
        if journal.over_size_limit() {
            self.checkpoint_requested.store(true, Ordering::Release);
        }
        Ok(lsn)
    }

    /// Flushes buffered records, syncing if `force_sync`, and starts a new
    /// file if `switch_files`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or rotation fails.
    pub fn flush(&self, force_sync: bool, switch_files: bool) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        journal.flush(true, force_sync)?;
        if switch_files {
            journal.switch_files()?;
        }
        Ok(())
    }

    /// Writes a checkpoint tagged `txn_id`, rotating if `switch_files` and
    /// the file is past the rotation threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be made durable.
    pub fn checkpoint(&self, txn_id: TxnId, switch_files: bool) -> CoreResult<Lsn> {
        let mut journal = self.journal.lock();
        let lsn = journal.checkpoint(txn_id, switch_files)?;
        self.checkpoint_requested.store(false, Ordering::Release);
        info!(%lsn, file = ?journal.current_file(), "journal checkpoint");
        Ok(lsn)
    }

    /// Returns and clears the flag set when the active file reached the
    /// configured size limit.
    pub fn take_checkpoint_request(&self) -> bool {
        self.checkpoint_requested.swap(false, Ordering::AcqRel)
    }

    /// Returns the rotation threshold.
    #[must_use]
    pub fn journal_size_min(&self) -> u64 {
        self.journal.lock().journal_size_min()
    }

    /// Overrides the rotation threshold at runtime.
    pub fn set_journal_size_min(&self, bytes: u64) {
        debug!(bytes, "journal size minimum changed");
        self.journal.lock().set_journal_size_min(bytes);
    }

    /// Deletes journal files numbered below `num`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn remove_files_before(&self, num: u32) -> CoreResult<usize> {
        self.journal.lock().remove_files_before(num)
    }

    /// Flushes and closes the journal, writing a final checkpoint if
    /// `checkpoint` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn shutdown(&self, checkpoint: Option<TxnId>) -> CoreResult<()> {
        self.journal.lock().shutdown(checkpoint)
    }
}

impl std::fmt::Debug for JournalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalManager")
            .field("dir", &self.dir)
            .field("journal", &*self.journal.lock())
            .finish_non_exhaustive()
    }
}
