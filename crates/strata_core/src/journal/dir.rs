//! Journal directory layout and locking.
//!
//! ```text
//! <journal_dir>/
//! ├─ journal.lck        # advisory lock, one writer per directory
//! ├─ 0000000006.log     # older file, kept until a checkpoint retires it
//! └─ 0000000007.log     # active file
//! ```
//!
//! File names are the file number as ten lowercase hex digits followed by
//! [`LOG_SUFFIX`]. Anything else in the directory is ignored.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Suffix of journal files.
pub const LOG_SUFFIX: &str = ".log";

/// Name of the lock file.
pub const LOCK_FILE: &str = "journal.lck";

/// Suffix given to a file that was in the way of a new journal file.
pub const BACKUP_SUFFIX: &str = ".bak";

const FILE_NUM_DIGITS: usize = 10;

/// Returns the file name for journal file `num`.
#[must_use]
pub fn file_name(num: u32) -> String {
    format!("{num:0width$x}{LOG_SUFFIX}", width = FILE_NUM_DIGITS)
}

/// Parses a journal file name back into its number.
#[must_use]
pub fn parse_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(LOG_SUFFIX)?;
    if stem.len() != FILE_NUM_DIGITS
        || !stem
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    u32::from_str_radix(stem, 16).ok()
}

/// Returns the numbers of all journal files in `dir`, ascending.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_files(dir: &Path) -> CoreResult<Vec<u32>> {
    let mut nums = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(num) = entry.file_name().to_str().and_then(parse_file_name) {
            nums.push(num);
        }
    }
    nums.sort_unstable();
    Ok(nums)
}

/// Returns the highest journal file number in `dir`, if any.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn find_last_file(dir: &Path) -> CoreResult<Option<u32>> {
    Ok(list_files(dir)?.last().copied())
}

/// An opened, locked journal directory.
///
/// The lock is held for as long as this value lives. A second `open` on the
/// same directory, from this process or another, fails with
/// [`CoreError::JournalLocked`].
#[derive(Debug)]
pub struct JournalDir {
    path: PathBuf,
    _lock_file: File,
}

impl JournalDir {
    /// Creates the directory if needed and takes the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a directory, the directory is
    /// locked, or an I/O error occurs.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "journal path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::JournalLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of journal file `num`.
    #[must_use]
    pub fn file_path(&self, num: u32) -> PathBuf {
        self.path.join(file_name(num))
    }

    /// Returns the highest journal file number, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn last_file(&self) -> CoreResult<Option<u32>> {
        find_last_file(&self.path)
    }

    /// Returns all journal file numbers, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn files(&self) -> CoreResult<Vec<u32>> {
        list_files(&self.path)
    }

    /// Moves an existing file at `num`'s path out of the way.
    ///
    /// Returns the backup path if a file was moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn displace(&self, num: u32) -> CoreResult<Option<PathBuf>> {
        let path = self.file_path(num);
        if !path.exists() {
            return Ok(None);
        }
        let mut backup = path.clone().into_os_string();
        backup.push(BACKUP_SUFFIX);
        let backup = PathBuf::from(backup);
        fs::rename(&path, &backup)?;
        self.sync()?;
        Ok(Some(backup))
    }

    /// Deletes journal file `num` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn remove(&self, num: u32) -> CoreResult<bool> {
        match fs::remove_file(self.file_path(num)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Syncs directory metadata so creates, renames and deletes are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs directory metadata so creates, renames and deletes are durable.
    #[cfg(not(unix))]
    pub fn sync(&self) -> CoreResult<()> {
        Ok(())
    }
}
