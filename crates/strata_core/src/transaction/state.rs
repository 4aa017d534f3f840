//! Transaction handles.

use super::manager::TransactionManager;
use crate::error::{CoreError, CoreResult};
use crate::journal::Loggable;
use crate::types::{Lsn, TxnId};
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Started; may log mutations.
    Active,
    /// A commit record was written.
    Committed,
    /// An abort record was written.
    Aborted,
}

/// A transaction bound to its manager.
///
/// The storage layer logs mutations through [`Txn::journal`]. The
/// transaction then ends in one of three ways:
///
/// - [`Txn::commit`] writes `TxnCommit`
/// - [`Txn::abort`] writes `TxnAbort`; the manager keeps the transaction
///   registered until its effects are rolled back
/// - [`Txn::close`] or drop without either writes nothing, and the next
///   recovery rolls the transaction back
///
/// Writing a second terminal record is refused.
pub struct Txn<'a> {
    id: TxnId,
    state: TxnState,
    manager: &'a TransactionManager,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(id: TxnId, manager: &'a TransactionManager) -> Self {
        Self {
            id,
            state: TxnState::Active,
            manager,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true until commit or abort.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Logs a mutation made by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionProtocol`] if the transaction has
    /// ended, the record belongs to another transaction, or the record is a
    /// boundary record. Returns a journal error if the write fails.
    pub fn journal(&self, record: &Loggable) -> CoreResult<Lsn> {
        if !self.is_active() {
            return Err(CoreError::protocol(
                self.id,
                format!(
                    "{} logged after the transaction ended",
                    record.entry_type().name()
                ),
            ));
        }
        if record.txn_id() != self.id {
            return Err(CoreError::protocol(
                self.id,
                format!("record belongs to {}", record.txn_id()),
            ));
        }
        if !record.is_mutation() {
            return Err(CoreError::protocol(
                self.id,
                format!(
                    "{} is written by the transaction manager",
                    record.entry_type().name()
                ),
            ));
        }
        self.manager.log_operation(self.id, record)
    }

    /// Forces every record logged so far to disk.
    ///
    /// Storage layers call this before touching anything the journal does
    /// not buffer, such as moving or writing a file, so that the record
    /// describing the change is durable before the change itself.
    ///
    /// # Errors
    ///
    /// Returns a journal error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.manager.flush_journal()
    }

    /// Writes the commit record.
    ///
    /// The record is flushed before this returns, and synced when the
    /// journal syncs on commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionProtocol`] if the transaction already
    /// committed or aborted, or a journal error.
    pub fn commit(&mut self) -> CoreResult<()> {
        match self.state {
            TxnState::Active => {}
            TxnState::Committed => return Err(CoreError::protocol(self.id, "double commit")),
            TxnState::Aborted => return Err(CoreError::protocol(self.id, "commit after abort")),
        }
        self.manager.commit(self.id)?;
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Writes the abort record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionProtocol`] if the transaction already
    /// committed or aborted, or a journal error.
    pub fn abort(&mut self) -> CoreResult<()> {
        match self.state {
            TxnState::Active => {}
            TxnState::Committed => return Err(CoreError::protocol(self.id, "abort after commit")),
            TxnState::Aborted => return Err(CoreError::protocol(self.id, "double abort")),
        }
        self.manager.abort(self.id)?;
        self.state = TxnState::Aborted;
        Ok(())
    }

    /// Releases the transaction.
    ///
    /// After a commit or abort this only frees resources. On an active
    /// transaction no record is written; the manager keeps it registered as
    /// abandoned and the next recovery rolls it back.
    pub fn close(self) {}
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            debug!(txn = %self.id, "transaction closed without commit");
            self.manager.abandon(self.id);
        }
    }
}

impl std::fmt::Debug for Txn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
