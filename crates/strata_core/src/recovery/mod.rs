//! Crash recovery.
//!
//! Recovery reads the log from the newest file that holds a checkpoint
//! through the newest file. Files switched without a checkpoint are read in
//! number order as one log; with no checkpoint anywhere every file is read.
//! Three passes run over that range:
//!
//! 1. **Analysis** finds the last checkpoint and the highest transaction id.
//!    A log that is empty or ends in a checkpoint was shut down cleanly and
//!    needs nothing else.
//! 2. **Redo** replays every record after the last checkpoint in log order,
//!    for committed and uncommitted transactions alike, while tracking each
//!    transaction's fate. The one exception is binary records of
//!    transactions that never committed: their file operations are already
//!    on disk, and replaying them after an interrupted recovery would move
//!    content that recovery had already put back.
//!    A transaction's abort record is where its work is reversed, newest
//!    record first, so later transactions replay on top of the rolled-back
//!    state.
//! 3. **Undo** reverses the records of every transaction still active at
//!    the end of the log, newest record first.
//!
//! Undo leaves a binary record alone when another transaction logged a
//! binary record for the same path afterwards.
//!
//! Every redo and undo is idempotent, so a crash during recovery is handled
//! by simply recovering again. The caller finishes the job by syncing
//! storage and writing a checkpoint to a new journal file; until that
//! checkpoint is durable the old file remains the source of truth.

mod apply;
#[cfg(test)]
pub(crate) mod mock;
mod target;

pub use apply::{binary_path, redo, rollback, undo, undo_with_prior};
pub use target::RecoveryTarget;

use crate::error::{CoreError, CoreResult};
use crate::journal::{list_files, EntryType, JournalReader, Loggable};
use crate::types::{Lsn, TxnId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a recovery run found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// The newest journal file, if any existed.
    pub file: Option<u32>,
    /// Journal files read, oldest first.
    pub files: Vec<u32>,
    /// LSN of the last checkpoint in those files.
    pub checkpoint: Option<Lsn>,
    /// True if the log was empty or ended in a checkpoint.
    pub clean_shutdown: bool,
    /// Records read during analysis.
    pub records_scanned: usize,
    /// Records replayed.
    pub redone: usize,
    /// Binary records of uncommitted transactions left to undo alone.
    pub skipped: usize,
    /// Records reversed.
    pub undone: usize,
    /// Binary records of rolled-back transactions left alone because a
    /// later transaction reused the path.
    pub superseded: usize,
    /// Transactions found committed after the checkpoint, ascending.
    pub committed: Vec<TxnId>,
    /// Transactions rolled back, ascending.
    pub rolled_back: Vec<TxnId>,
    /// Highest transaction id seen anywhere in the files read.
    pub max_txn_id: Option<TxnId>,
    /// Offset where an incomplete final record of the newest file was
    /// discarded.
    pub torn_tail: Option<u64>,
}

impl RecoveryReport {
    /// Returns the first transaction id that is safe to hand out.
    #[must_use]
    pub fn next_txn_id(&self) -> u64 {
        self.max_txn_id.map_or(1, |id| id.0 + 1)
    }

    /// Returns true if storage was touched and must be checkpointed before
    /// new work starts.
    #[must_use]
    pub fn needs_checkpoint(&self) -> bool {
        self.file.is_some() && (!self.clean_shutdown || self.torn_tail.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug)]
struct TxnEntry {
    fate: Fate,
    /// Mutations after the checkpoint; kept only while undo may need them.
    ops: Vec<(Lsn, Loggable)>,
}

#[derive(Debug, Default)]
struct Analysis {
    checkpoint: Option<Lsn>,
    committed: HashSet<TxnId>,
    last: Option<EntryType>,
    max_txn_id: Option<TxnId>,
    records: usize,
    torn_tail: Option<u64>,
    /// Every binary record per path, in log order.
    binary_touches: HashMap<String, Vec<(Lsn, TxnId)>>,
}

impl Analysis {
    /// True if a transaction other than `txn` logged a binary record for
    /// `path` after `lsn`.
    fn touched_later(&self, path: &str, lsn: Lsn, txn: TxnId) -> bool {
        self.binary_touches
            .get(path)
            .is_some_and(|touches| touches.iter().any(|(l, t)| *l > lsn && *t != txn))
    }
}

/// Runs recovery over a journal directory.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    dir: PathBuf,
}

impl RecoveryManager {
    /// Creates a recovery manager for the journal files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Recovers `target` from the journal files since the last checkpoint.
    ///
    /// # Errors
    ///
    /// Fails on corruption anywhere before the final record, on a
    /// transaction protocol violation, or when redo or undo cannot be
    /// applied. Storage may then be partially recovered; running recovery
    /// again after fixing the cause is safe.
    pub fn recover<T: RecoveryTarget + ?Sized>(&self, target: &mut T) -> CoreResult<RecoveryReport> {
        let files = list_files(&self.dir)?;
        let Some(&file) = files.last() else {
            debug!(dir = %self.dir.display(), "no journal files; nothing to recover");
            return Ok(RecoveryReport {
                clean_shutdown: true,
                ..RecoveryReport::default()
            });
        };

        let range = self.replay_range(&files)?;
        let analysis = self.analyze(range)?;
        let clean = matches!(analysis.last, None | Some(EntryType::Checkpoint));
        let mut report = RecoveryReport {
            file: Some(file),
            files: range.to_vec(),
            checkpoint: analysis.checkpoint,
            clean_shutdown: clean,
            records_scanned: analysis.records,
            max_txn_id: analysis.max_txn_id,
            torn_tail: analysis.torn_tail,
            ..RecoveryReport::default()
        };

        if let Some(offset) = analysis.torn_tail {
            warn!(file, offset, "journal ends in an incomplete record; discarding it");
        }
        if clean {
            debug!(file, records = analysis.records, "journal was shut down cleanly");
            return Ok(report);
        }

        info!(
            files = ?range,
            checkpoint = ?analysis.checkpoint,
            records = analysis.records,
            "journal was not shut down cleanly; running recovery"
        );

        let txns = self.redo_pass(range, &analysis, target, &mut report)?;
        Self::undo_pass(txns, &analysis, target, &mut report)?;

        info!(
            redone = report.redone,
            undone = report.undone,
            superseded = report.superseded,
            committed = report.committed.len(),
            rolled_back = report.rolled_back.len(),
            "recovery finished"
        );
        Ok(report)
    }

    /// Returns the files to read: from the newest one holding a checkpoint
    /// to the end, or all of them when none does.
    fn replay_range<'a>(&self, files: &'a [u32]) -> CoreResult<&'a [u32]> {
        for (i, &file) in files.iter().enumerate().rev() {
            if self.has_checkpoint(file)? {
                if i + 1 < files.len() {
                    debug!(from = file, to = ?files.last(), "newest checkpoint is in an older file");
                }
                return Ok(&files[i..]);
            }
        }
        Ok(files)
    }

    fn has_checkpoint(&self, file: u32) -> CoreResult<bool> {
        let mut reader = JournalReader::open(&self.dir, file)?;
        while let Some((_, record)) = reader.next_entry()? {
            if record.entry_type() == EntryType::Checkpoint {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn analyze(&self, files: &[u32]) -> CoreResult<Analysis> {
        let mut analysis = Analysis::default();
        for &file in files {
            let mut reader = JournalReader::open(&self.dir, file)?;
            while let Some((lsn, record)) = reader.next_entry()? {
                analysis.records += 1;
                let txn = record.txn_id();
                analysis.max_txn_id = Some(analysis.max_txn_id.map_or(txn, |m| m.max(txn)));
                if let Some(path) = binary_path(&record) {
                    analysis
                        .binary_touches
                        .entry(path.to_string())
                        .or_default()
                        .push((lsn, txn));
                }
                match record.entry_type() {
                    EntryType::Checkpoint => analysis.checkpoint = Some(lsn),
                    EntryType::TxnCommit => {
                        analysis.committed.insert(txn);
                    }
                    _ => {}
                }
                analysis.last = Some(record.entry_type());
            }
            // Only the newest file's tail is reported; an older torn record
            // was followed by a restart.
            analysis.torn_tail = reader.torn_tail();
        }
        Ok(analysis)
    }

    fn redo_pass<T: RecoveryTarget + ?Sized>(
        &self,
        files: &[u32],
        analysis: &Analysis,
        target: &mut T,
        report: &mut RecoveryReport,
    ) -> CoreResult<HashMap<TxnId, TxnEntry>> {
        let checkpoint = analysis.checkpoint;
        let mut txns: HashMap<TxnId, TxnEntry> = HashMap::new();

        for &file in files {
            let mut reader = JournalReader::open(&self.dir, file)?;
            while let Some((lsn, record)) = reader.next_entry()? {
                if checkpoint.is_some_and(|cp| lsn <= cp) {
                    continue;
                }
                let txn = record.txn_id();
                match record.entry_type() {
                    EntryType::Checkpoint => {}
                    EntryType::TxnStart => {
                        if txns.contains_key(&txn) {
                            return Err(CoreError::protocol(
                                txn,
                                format!("duplicate start record at {lsn}"),
                            ));
                        }
                        txns.insert(
                            txn,
                            TxnEntry {
                                fate: Fate::Active,
                                ops: Vec::new(),
                            },
                        );
                    }
                    EntryType::TxnCommit | EntryType::TxnAbort => {
                        let entry = Self::entry(&mut txns, txn, lsn);
                        if entry.fate != Fate::Active {
                            return Err(CoreError::protocol(
                                txn,
                                format!("second terminal record at {lsn}"),
                            ));
                        }
                        let ops = std::mem::take(&mut entry.ops);
                        if record.entry_type() == EntryType::TxnCommit {
                            entry.fate = Fate::Committed;
                        } else {
                            // Undone here, before later transactions are
                            // replayed on top of the rolled-back state.
                            entry.fate = Fate::Aborted;
                            debug!(txn = %txn, ops = ops.len(), "rolling back aborted transaction");
                            Self::undo_ops(Self::with_priors(ops), analysis, target, report)?;
                            report.rolled_back.push(txn);
                        }
                    }
                    _ => {
                        let entry = Self::entry(&mut txns, txn, lsn);
                        if entry.fate != Fate::Active {
                            return Err(CoreError::protocol(
                                txn,
                                format!(
                                    "{} at {lsn} follows the terminal record",
                                    record.entry_type().name()
                                ),
                            ));
                        }
                        if binary_path(&record).is_some() && !analysis.committed.contains(&txn) {
                            report.skipped += 1;
                        } else {
                            redo(&record, target).map_err(|e| {
                                CoreError::recovery(format!(
                                    "redo of {} at {lsn}: {e}",
                                    record.summary()
                                ))
                            })?;
                            report.redone += 1;
                        }
                        entry.ops.push((lsn, record));
                    }
                }
            }
        }

        let mut committed: Vec<_> = txns
            .iter()
            .filter(|(_, e)| e.fate == Fate::Committed)
            .map(|(id, _)| *id)
            .collect();
        committed.sort_unstable();
        report.committed = committed;
        Ok(txns)
    }

    /// Returns the table entry for `txn`, registering it as active if its
    /// start lies before the checkpoint.
    fn entry(txns: &mut HashMap<TxnId, TxnEntry>, txn: TxnId, lsn: Lsn) -> &mut TxnEntry {
        txns.entry(txn).or_insert_with(|| {
            warn!(txn = %txn, lsn = %lsn, "record for a transaction with no start record");
            TxnEntry {
                fate: Fate::Active,
                ops: Vec::new(),
            }
        })
    }

    /// Undoes every transaction still active at the end of the log.
    fn undo_pass<T: RecoveryTarget + ?Sized>(
        txns: HashMap<TxnId, TxnEntry>,
        analysis: &Analysis,
        target: &mut T,
        report: &mut RecoveryReport,
    ) -> CoreResult<()> {
        let mut losers = Vec::new();
        let mut ops = Vec::new();
        for (id, entry) in txns {
            if entry.fate != Fate::Active {
                continue;
            }
            losers.push(id);
            ops.extend(Self::with_priors(entry.ops));
        }
        losers.sort_unstable();

        if !losers.is_empty() {
            info!(count = losers.len(), ids = ?losers, "rolling back uncommitted transactions");
        }
        Self::undo_ops(ops, analysis, target, report)?;
        report.rolled_back.extend(losers);
        report.rolled_back.sort_unstable();
        Ok(())
    }

    /// Pairs each record with the previous binary record of its
    /// transaction on the same path.
    fn with_priors(ops: Vec<(Lsn, Loggable)>) -> Vec<(Lsn, Loggable, Option<Loggable>)> {
        let mut last_on_path: HashMap<String, Loggable> = HashMap::new();
        ops.into_iter()
            .map(|(lsn, record)| {
                let prior = binary_path(&record)
                    .and_then(|path| last_on_path.insert(path.to_string(), record.clone()));
                (lsn, record, prior)
            })
            .collect()
    }

    /// Undoes `ops` in descending LSN order.
    ///
    /// A binary record is skipped when another transaction logged a binary
    /// record for the same path later: the file system already holds that
    /// transaction's work.
    fn undo_ops<T: RecoveryTarget + ?Sized>(
        mut ops: Vec<(Lsn, Loggable, Option<Loggable>)>,
        analysis: &Analysis,
        target: &mut T,
        report: &mut RecoveryReport,
    ) -> CoreResult<()> {
        ops.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (lsn, record, prior) in &ops {
            if let Some(path) = binary_path(record) {
                if analysis.touched_later(path, *lsn, record.txn_id()) {
                    debug!(%lsn, path, "path reused by a later transaction; not undoing");
                    report.superseded += 1;
                    continue;
                }
            }
            undo_with_prior(record, prior.as_ref(), target).map_err(|e| {
                CoreError::recovery(format!("undo of {} at {lsn}: {e}", record.summary()))
            })?;
            report.undone += 1;
        }
        Ok(())
    }
}
