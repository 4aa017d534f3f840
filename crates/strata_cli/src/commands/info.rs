//! Info command implementation.

use super::{outcomes, scan_file, since_last_checkpoint, Outcomes};
use serde::Serialize;
use std::path::Path;
use strata_core::journal::list_files;

/// Journal summary.
#[derive(Debug, Serialize)]
pub struct JournalInfo {
    /// Journal directory.
    pub dir: String,
    /// Every journal file, oldest first.
    pub files: Vec<FileInfo>,
    /// True if no record follows the last checkpoint.
    pub clean_shutdown: bool,
    /// Highest transaction id in any file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_txn_id: Option<u64>,
    /// Transactions after the last checkpoint, in whichever file it lies.
    pub pending: Outcomes,
}

/// Summary of one journal file.
#[derive(Debug, Serialize)]
pub struct FileInfo {
    /// File number.
    pub file: u32,
    /// Size in bytes.
    pub size: u64,
    /// Records decoded.
    pub records: usize,
    /// LSN of the last checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// Offset of an incomplete final record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_tail: Option<u64>,
    /// Corruption that stopped the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the info command.
pub fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No journal directory at {}", dir.display()).into());
    }

    let scans = list_files(dir)?
        .into_iter()
        .map(|file| scan_file(dir, file))
        .collect::<Result<Vec<_>, _>>()?;
    let pending = since_last_checkpoint(&scans);
    let info = JournalInfo {
        dir: dir.display().to_string(),
        clean_shutdown: pending.is_empty(),
        max_txn_id: scans
            .iter()
            .flat_map(|scan| scan.records.iter())
            .map(|(_, r)| r.txn_id().0)
            .max(),
        pending: outcomes(&pending),
        files: scans
            .into_iter()
            .map(|scan| FileInfo {
                file: scan.file,
                size: scan.size,
                records: scan.records.len(),
                checkpoint: scan.last_checkpoint().map(|lsn| lsn.to_string()),
                torn_tail: scan.torn_tail,
                error: scan.error,
            })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&info)?),
        _ => print_text_output(&info),
    }
    Ok(())
}

fn print_text_output(info: &JournalInfo) {
    println!("Journal: {}", info.dir);
    println!("================");
    println!();

    if info.files.is_empty() {
        println!("No journal files");
        return;
    }

    for file in &info.files {
        print!(
            "[{:010x}] {:>10} bytes {:>8} records",
            file.file, file.size, file.records
        );
        if let Some(ref checkpoint) = file.checkpoint {
            print!(" checkpoint={checkpoint}");
        }
        if let Some(offset) = file.torn_tail {
            print!(" torn-tail={offset}");
        }
        println!();
        if let Some(ref error) = file.error {
            println!("    ERROR: {error}");
        }
    }

    println!();
    println!(
        "Shutdown: {}",
        if info.clean_shutdown { "clean" } else { "recovery needed" }
    );
    if let Some(max) = info.max_txn_id {
        println!("Next transaction id: {}", max + 1);
    }
    if !info.clean_shutdown {
        println!("  committed (redo only): {:?}", info.pending.committed);
        println!("  aborted (roll back):   {:?}", info.pending.aborted);
        println!("  unfinished (roll back): {:?}", info.pending.unfinished);
    }
}
