//! Verify command implementation.

use super::{protocol_errors, scan_file, FileScan};
use std::path::Path;
use strata_core::journal::list_files;

/// Verification result for one file.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records decoded.
    pub records_checked: usize,
    /// Problems found.
    pub errors: Vec<String>,
    /// Problems recovery tolerates.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying journal at {}", dir.display());
    println!();

    let files = list_files(dir)?;
    if files.is_empty() {
        println!("No journal files (this may be normal for new databases)");
        return Ok(());
    }

    let mut ok = true;
    for (i, &file) in files.iter().enumerate() {
        let scan = scan_file(dir, file)?;
        let result = verify_file(&scan, i + 1 == files.len());
        print_result(scan.file, &result);
        ok &= result.is_ok();
    }

    println!();
    if ok {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

/// Checks one scanned file.
///
/// A torn record is tolerated in any file: in an older one it means a crash
/// before the next open finished its checkpoint.
pub fn verify_file(scan: &FileScan, newest: bool) -> VerifyResult {
    let mut result = VerifyResult {
        records_checked: scan.records.len(),
        ..VerifyResult::default()
    };
    if let Some(ref error) = scan.error {
        result.errors.push(error.clone());
    }
    if let Some(offset) = scan.torn_tail {
        let mut message = format!("incomplete record at offset {offset}");
        if !newest {
            message.push_str(", followed by a newer file");
        }
        result.warnings.push(message);
    }
    result.errors.extend(protocol_errors(&scan.records));
    result
}

fn print_result(file: u32, result: &VerifyResult) {
    println!(
        "  [{:010x}] records checked: {}, errors: {}",
        file,
        result.records_checked,
        result.errors.len()
    );
    for warning in &result.warnings {
        println!("    WARNING: {warning}");
    }
    for error in &result.errors {
        println!("    ERROR: {error}");
    }
}
