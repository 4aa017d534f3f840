//! Dump command implementation.

use super::scan_file;
use serde::Serialize;
use std::path::Path;
use strata_core::journal::find_last_file;
use strata_core::{Loggable, Lsn};

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Position of the record.
    pub lsn: String,
    /// Record type name.
    pub record_type: &'static str,
    /// Transaction id.
    pub txn: u64,
    /// Type-specific detail.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl RecordInfo {
    fn new(lsn: Lsn, record: &Loggable) -> Self {
        Self {
            lsn: lsn.to_string(),
            record_type: record.entry_type().name(),
            txn: record.txn_id().0,
            detail: record.summary(),
        }
    }
}

/// Runs the dump command.
pub fn run(
    dir: &Path,
    file: Option<u32>,
    limit: Option<usize>,
    txn: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = match file {
        Some(file) => file,
        None => find_last_file(dir)?.ok_or("No journal files found")?,
    };

    let scan = scan_file(dir, file)?;
    let records: Vec<RecordInfo> = scan
        .records
        .iter()
        .filter(|(_, r)| txn.map_or(true, |t| r.txn_id().0 == t))
        .take(limit.unwrap_or(usize::MAX))
        .map(|(lsn, r)| RecordInfo::new(*lsn, r))
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => {
            println!("Journal file {file:010x} ({} records)", records.len());
            println!("================");
            println!();
            for record in &records {
                print!("[{:>12}] {:22} txn={}", record.lsn, record.record_type, record.txn);
                if !record.detail.is_empty() {
                    print!(" {}", record.detail);
                }
                println!();
            }
        }
    }

    if let Some(offset) = scan.torn_tail {
        eprintln!("note: incomplete record at offset {offset} ignored");
    }
    if let Some(error) = scan.error {
        return Err(format!("Stopped at corruption: {error}").into());
    }
    Ok(())
}
