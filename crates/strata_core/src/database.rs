//! Database facade and startup recovery.

use crate::config::Config;
use crate::error::CoreResult;
use crate::journal::JournalManager;
use crate::recovery::{rollback, RecoveryManager, RecoveryReport, RecoveryTarget};
use crate::transaction::{TransactionManager, Txn};
use crate::types::Lsn;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Ties a storage layer to the journal and transaction manager.
///
/// # Opening
///
/// [`Database::open`] recovers the storage from the journal files since the
/// last checkpoint, then starts a fresh file holding a single checkpoint and deletes the
/// older ones. Any recovery error aborts the open.
///
/// ```rust,ignore
/// let db = Database::open(Config::new("data"), store)?;
/// let mut txn = db.begin()?;
/// txn.journal(&record)?;
/// txn.commit()?;
/// db.close()?;
/// ```
///
/// # Crashes
///
/// Dropping a `Database` without [`Database::close`] writes nothing: bytes
/// still in the journal buffer are lost and the next open recovers.
///
/// Lock order is storage, then journal.
pub struct Database<S: RecoveryTarget> {
    config: Config,
    storage: Mutex<S>,
    journal: Option<Arc<JournalManager>>,
    txn_manager: TransactionManager,
    report: RecoveryReport,
    closed: AtomicBool,
}

impl<S: RecoveryTarget> Database<S> {
    /// Opens the database, recovering `storage` first.
    ///
    /// With recovery disabled no journal is opened and transactions log
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal directory is locked or unreadable, or
    /// if recovery fails.
    pub fn open(config: Config, mut storage: S) -> CoreResult<Self> {
        if !config.recovery_enabled {
            info!(data_dir = %config.data_dir().display(), "journal disabled; opening without recovery");
            return Ok(Self {
                config,
                storage: Mutex::new(storage),
                journal: None,
                txn_manager: TransactionManager::new(None, Arc::new(AtomicU64::new(1))),
                report: RecoveryReport {
                    clean_shutdown: true,
                    ..RecoveryReport::default()
                },
                closed: AtomicBool::new(false),
            });
        }

        let journal = Arc::new(JournalManager::open(&config)?);
        let report = RecoveryManager::new(journal.journal_dir()).recover(&mut storage)?;
        let counter = Arc::new(AtomicU64::new(report.next_txn_id()));
        let txn_manager = TransactionManager::new(Some(Arc::clone(&journal)), counter);

        // The new file must hold a checkpoint before the old ones go away.
        storage.sync()?;
        let file = journal.initialize()?;
        txn_manager.checkpoint(false)?;
        let removed = journal.remove_files_before(file)?;
        storage.discard_backups()?;

        if report.needs_checkpoint() {
            info!(
                file,
                removed,
                redone = report.redone,
                undone = report.undone,
                "recovery completed"
            );
        } else {
            debug!(file, removed, "journal started");
        }

        Ok(Self {
            config,
            storage: Mutex::new(storage),
            journal: Some(journal),
            txn_manager,
            report,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the start record cannot be written.
    pub fn begin(&self) -> CoreResult<Txn<'_>> {
        self.txn_manager.begin_transaction()
    }

    /// Aborts `txn` and rolls its effects back in storage.
    ///
    /// [`Txn::abort`] alone only writes the abort record and leaves the
    /// effects for the next recovery to reverse. Until then the transaction
    /// stays registered: checkpoints are skipped and [`Database::close`]
    /// writes no final checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::TransactionProtocol`] if the transaction
    /// already ended, a journal error, or the error of the first undo that
    /// fails. A failed undo is finished by the next recovery.
    pub fn abort(&self, txn: &mut Txn<'_>) -> CoreResult<()> {
        let mut storage = self.storage.lock();
        let ops = self
            .txn_manager
            .operations(txn.id())
            .unwrap_or_default();
        txn.abort()?;
        let undone = rollback(&ops, &mut *storage)?;
        self.txn_manager.rolled_back(txn.id());
        debug!(txn = %txn.id(), undone, "transaction rolled back");
        Ok(())
    }

    /// Locks and returns the storage layer.
    pub fn storage(&self) -> MutexGuard<'_, S> {
        self.storage.lock()
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.txn_manager
    }

    /// Returns the journal manager, if the journal is enabled.
    #[must_use]
    pub fn journal_manager(&self) -> Option<&Arc<JournalManager>> {
        self.journal.as_ref()
    }

    /// Returns what startup recovery did.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }

    /// Syncs storage and writes a checkpoint.
    ///
    /// Backups are discarded only when no transaction is active, since an
    /// active one may still need its backup for undo. Returns `None` without
    /// a journal, or while an aborted transaction awaits rollback.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be synced or the checkpoint cannot
    /// be made durable.
    pub fn checkpoint(&self, switch_files: bool) -> CoreResult<Option<Lsn>> {
        let mut storage = self.storage.lock();
        storage.sync()?;
        let lsn = self.txn_manager.checkpoint(switch_files)?;
        if self.txn_manager.is_idle() {
            storage.discard_backups()?;
        }
        Ok(lsn)
    }

    /// Writes a checkpoint if the journal has grown past its size limit.
    ///
    /// # Errors
    ///
    /// See [`Database::checkpoint`].
    pub fn checkpoint_if_requested(&self) -> CoreResult<Option<Lsn>> {
        match &self.journal {
            Some(journal) if journal.take_checkpoint_request() => {
                debug!("journal size limit reached; checkpointing");
                self.checkpoint(false)
            }
            _ => Ok(None),
        }
    }

    /// Flushes and syncs buffered journal records without checkpointing.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be written.
    pub fn flush_journal(&self) -> CoreResult<()> {
        match &self.journal {
            Some(journal) => journal.flush(true, false),
            None => Ok(()),
        }
    }

    /// Sets the size above which a checkpoint starts a new journal file.
    pub fn set_journal_size_min(&self, bytes: u64) {
        if let Some(journal) = &self.journal {
            journal.set_journal_size_min(bytes);
        }
    }

    /// Shuts down in order: storage sync, then the journal with a final
    /// checkpoint if no transaction is active.
    ///
    /// Calling `close` twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be synced or the journal cannot be
    /// closed.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut storage = self.storage.lock();
        storage.sync()?;
        let idle = self.txn_manager.is_idle();
        self.txn_manager.shutdown()?;
        if idle {
            storage.discard_backups()?;
        }
        info!("database closed");
        Ok(())
    }
}

impl<S: RecoveryTarget> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.config.data_dir())
            .field("journal", &self.journal)
            .field("txn_manager", &self.txn_manager)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
