//! CLI command implementations.

pub mod dump;
pub mod info;
pub mod verify;

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strata_core::journal::file_name;
use strata_core::{Config, EntryType, JournalReader, Loggable, Lsn, TxnId};

/// Resolves the journal directory from the global options.
pub fn journal_dir(
    path: Option<PathBuf>,
    journal: Option<PathBuf>,
    command: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = path.ok_or_else(|| format!("Data directory required for {command}"))?;
    let mut config = Config::new(path);
    if let Some(journal) = journal {
        config = config.journal_dir(journal);
    }
    Ok(config.resolved_journal_dir())
}

/// Everything read from one journal file.
#[derive(Debug)]
pub struct FileScan {
    /// Journal file number.
    pub file: u32,
    /// File size in bytes.
    pub size: u64,
    /// Records decoded before the end of the file or the first error.
    pub records: Vec<(Lsn, Loggable)>,
    /// Offset of an incomplete final record.
    pub torn_tail: Option<u64>,
    /// The error that stopped the scan.
    pub error: Option<String>,
}

impl FileScan {
    /// Returns the LSN of the last checkpoint.
    pub fn last_checkpoint(&self) -> Option<Lsn> {
        self.records
            .iter()
            .rev()
            .find(|(_, r)| r.entry_type() == EntryType::Checkpoint)
            .map(|(lsn, _)| *lsn)
    }

    /// Records after the last checkpoint in this file, or all of them.
    pub fn since_checkpoint(&self) -> &[(Lsn, Loggable)] {
        let start = self
            .records
            .iter()
            .rposition(|(_, r)| r.entry_type() == EntryType::Checkpoint)
            .map_or(0, |i| i + 1);
        &self.records[start..]
    }
}

/// Reads journal file `file` in `dir` to its end.
///
/// Corruption does not fail the scan; it is recorded in
/// [`FileScan::error`].
pub fn scan_file(dir: &Path, file: u32) -> Result<FileScan, Box<dyn std::error::Error>> {
    let size = std::fs::metadata(dir.join(file_name(file)))?.len();
    let mut scan = FileScan {
        file,
        size,
        records: Vec::new(),
        torn_tail: None,
        error: None,
    };

    let mut reader = match JournalReader::open(dir, file) {
        Ok(reader) => reader,
        Err(e) => {
            scan.error = Some(e.to_string());
            return Ok(scan);
        }
    };
    loop {
        match reader.next_entry() {
            Ok(Some(entry)) => scan.records.push(entry),
            Ok(None) => break,
            Err(e) => {
                scan.error = Some(e.to_string());
                break;
            }
        }
    }
    scan.torn_tail = reader.torn_tail();
    Ok(scan)
}

/// Records recovery would replay: everything after the last checkpoint,
/// which may lie in an older file than the newest.
pub fn since_last_checkpoint(scans: &[FileScan]) -> Vec<(Lsn, Loggable)> {
    let start = scans
        .iter()
        .rposition(|s| s.last_checkpoint().is_some())
        .unwrap_or(0);
    let mut records = Vec::new();
    for (i, scan) in scans.iter().enumerate().skip(start) {
        if i == start {
            records.extend_from_slice(scan.since_checkpoint());
        } else {
            records.extend_from_slice(&scan.records);
        }
    }
    records
}

/// How the transactions in a run of records ended.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Outcomes {
    /// Transactions with a commit record.
    pub committed: Vec<u64>,
    /// Transactions with an abort record.
    pub aborted: Vec<u64>,
    /// Transactions with neither.
    pub unfinished: Vec<u64>,
}

/// Classifies every transaction that appears in `records`.
pub fn outcomes(records: &[(Lsn, Loggable)]) -> Outcomes {
    let mut fates: HashMap<TxnId, Option<EntryType>> = HashMap::new();
    for (_, record) in records {
        let kind = record.entry_type();
        if kind == EntryType::Checkpoint {
            continue;
        }
        let fate = fates.entry(record.txn_id()).or_default();
        if record.is_terminal() {
            *fate = Some(kind);
        }
    }

    let mut out = Outcomes::default();
    for (txn, fate) in fates {
        match fate {
            Some(EntryType::TxnCommit) => out.committed.push(txn.0),
            Some(_) => out.aborted.push(txn.0),
            None => out.unfinished.push(txn.0),
        }
    }
    out.committed.sort_unstable();
    out.aborted.sort_unstable();
    out.unfinished.sort_unstable();
    out
}

/// Finds violations of the transaction protocol within one file.
///
/// A transaction whose start lies in an earlier file is not an error.
pub fn protocol_errors(records: &[(Lsn, Loggable)]) -> Vec<String> {
    let mut fates: HashMap<TxnId, Option<EntryType>> = HashMap::new();
    let mut errors = Vec::new();
    for (lsn, record) in records {
        let txn = record.txn_id();
        match record.entry_type() {
            EntryType::Checkpoint => {}
            EntryType::TxnStart => {
                if fates.insert(txn, None).is_some() {
                    errors.push(format!("{lsn}: {txn} started twice"));
                }
            }
            kind => {
                let fate = fates.entry(txn).or_default();
                if let Some(end) = *fate {
                    errors.push(format!("{lsn}: {txn} logged {} after {}", kind.name(), end.name()));
                } else if record.is_terminal() {
                    *fate = Some(kind);
                }
            }
        }
    }
    errors
}
