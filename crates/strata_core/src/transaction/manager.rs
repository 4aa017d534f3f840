//! Transaction manager.

use super::state::Txn;
use crate::error::CoreResult;
use crate::journal::{JournalManager, Loggable};
use crate::types::{Lsn, TxnId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Allocates transaction ids and writes transaction boundary records.
///
/// The id counter is injected so that its owner decides where numbering
/// resumes (recovery hands over one past the highest id in the log) and so
/// that independent managers never share numbering by accident.
///
/// With no journal, ids are still handed out but nothing is logged; this is
/// the configuration with recovery disabled.
pub struct TransactionManager {
    journal: Option<Arc<JournalManager>>,
    next_txn_id: Arc<AtomicU64>,
    active: RwLock<HashMap<TxnId, InFlight>>,
}

/// A transaction whose effects recovery may still have to reverse.
#[derive(Debug, Default)]
struct InFlight {
    /// Mutations logged so far, in log order.
    ops: Vec<Loggable>,
    /// The handle was dropped without commit or abort.
    abandoned: bool,
    /// The abort record is written but storage still holds the effects.
    aborted: bool,
}

impl TransactionManager {
    /// Creates a manager over `journal`, drawing ids from `next_txn_id`.
    pub fn new(journal: Option<Arc<JournalManager>>, next_txn_id: Arc<AtomicU64>) -> Self {
        Self {
            journal,
            next_txn_id,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the journal, if logging is enabled.
    #[must_use]
    pub fn journal(&self) -> Option<&Arc<JournalManager>> {
        self.journal.as_ref()
    }

    /// Returns the id the next transaction will get.
    #[must_use]
    pub fn peek_next_txn_id(&self) -> TxnId {
        TxnId(self.next_txn_id.load(Ordering::SeqCst))
    }

    fn allocate_id(&self) -> TxnId {
        TxnId(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    fn write(&self, record: &Loggable) -> CoreResult<Lsn> {
        match &self.journal {
            Some(journal) => journal.journal(record),
            None => Ok(Lsn::INVALID),
        }
    }

    /// Starts a transaction and logs `TxnStart`.
    ///
    /// # Errors
    ///
    /// Returns an error if the start record cannot be written.
    pub fn begin_transaction(&self) -> CoreResult<Txn<'_>> {
        let txn_id = self.allocate_id();
        self.write(&Loggable::TxnStart { txn_id })?;
        self.active.write().insert(txn_id, InFlight::default());
        debug!(txn = %txn_id, "transaction started");
        Ok(Txn::new(txn_id, self))
    }

    pub(crate) fn log_operation(&self, txn_id: TxnId, record: &Loggable) -> CoreResult<Lsn> {
        let lsn = self.write(record)?;
        if let Some(txn) = self.active.write().get_mut(&txn_id) {
            txn.ops.push(record.clone());
        }
        Ok(lsn)
    }

    pub(crate) fn commit(&self, txn_id: TxnId) -> CoreResult<()> {
        let record = Loggable::TxnCommit { txn_id };
        if let Some(journal) = &self.journal {
            journal.journal_group(&record)?;
        }
        let ops = self.active.write().remove(&txn_id).map_or(0, |t| t.ops.len());
        debug!(txn = %txn_id, ops, "transaction committed");
        Ok(())
    }

    /// Writes the abort record. The transaction stays registered until
    /// [`TransactionManager::rolled_back`] reports its effects reversed, so
    /// that no checkpoint or clean shutdown hides them from recovery.
    pub(crate) fn abort(&self, txn_id: TxnId) -> CoreResult<()> {
        self.write(&Loggable::TxnAbort { txn_id })?;
        let ops = match self.active.write().get_mut(&txn_id) {
            Some(txn) => {
                txn.aborted = true;
                txn.ops.len()
            }
            None => 0,
        };
        debug!(txn = %txn_id, ops, "transaction aborted");
        Ok(())
    }

    /// Forgets an aborted transaction whose effects the storage layer has
    /// reversed.
    pub fn rolled_back(&self, txn_id: TxnId) {
        let mut active = self.active.write();
        if active.get(&txn_id).is_some_and(|t| t.aborted) {
            active.remove(&txn_id);
            debug!(txn = %txn_id, "aborted transaction rolled back");
        }
    }

    pub(crate) fn flush_journal(&self) -> CoreResult<()> {
        match &self.journal {
            Some(journal) => journal.flush(true, false),
            None => Ok(()),
        }
    }

    /// An abandoned transaction stays registered until the process ends, so
    /// that no checkpoint or clean shutdown hides its effects from recovery.
    pub(crate) fn abandon(&self, txn_id: TxnId) {
        if let Some(txn) = self.active.write().get_mut(&txn_id) {
            txn.abandoned = true;
        }
    }

    /// Returns the number of registered transactions: active, abandoned and
    /// aborted ones awaiting rollback.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Returns true if no transaction is registered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Returns the ids of registered transactions, ascending.
    #[must_use]
    pub fn active_transactions(&self) -> Vec<TxnId> {
        self.registered(|_| true)
    }

    /// Returns the ids of transactions dropped without commit or abort.
    #[must_use]
    pub fn abandoned_transactions(&self) -> Vec<TxnId> {
        self.registered(|t| t.abandoned)
    }

    /// Returns the ids of aborted transactions whose effects are still in
    /// storage.
    #[must_use]
    pub fn pending_rollbacks(&self) -> Vec<TxnId> {
        self.registered(|t| t.aborted)
    }

    fn registered(&self, filter: impl Fn(&InFlight) -> bool) -> Vec<TxnId> {
        let mut ids: Vec<_> = self
            .active
            .read()
            .iter()
            .filter(|(_, t)| filter(t))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns how many mutations an active transaction has logged.
    #[must_use]
    pub fn operation_count(&self, txn_id: TxnId) -> Option<usize> {
        self.active.read().get(&txn_id).map(|t| t.ops.len())
    }

    /// Returns the mutations an active transaction has logged, in log order.
    #[must_use]
    pub fn operations(&self, txn_id: TxnId) -> Option<Vec<Loggable>> {
        self.active.read().get(&txn_id).map(|t| t.ops.clone())
    }

    /// Writes a checkpoint under a freshly allocated id.
    ///
    /// Returns the checkpoint's LSN, or `None` without a journal. No
    /// checkpoint is written while an aborted transaction awaits rollback:
    /// its abort record must stay after the last checkpoint for recovery to
    /// reverse it.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be made durable.
    pub fn checkpoint(&self, switch_files: bool) -> CoreResult<Option<Lsn>> {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };
        let pending = self.pending_rollbacks();
        if !pending.is_empty() {
            warn!(ids = ?pending, "aborted transactions await rollback; checkpoint skipped");
            return Ok(None);
        }
        let txn_id = self.allocate_id();
        journal.checkpoint(txn_id, switch_files).map(Some)
    }

    /// Closes the journal.
    ///
    /// A final checkpoint is written only when no transaction is
    /// registered; otherwise the next startup recovers.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn shutdown(&self) -> CoreResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let active = self.active_transactions();
        if active.is_empty() {
            journal.shutdown(Some(self.allocate_id()))
        } else {
            warn!(
                count = active.len(),
                ids = ?active,
                "shutting down with unfinished transactions; recovery will roll them back"
            );
            journal.shutdown(None)
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("next_txn_id", &self.next_txn_id.load(Ordering::SeqCst))
            .field("active", &self.active.read().len())
            .finish_non_exhaustive()
    }
}
