//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in log devices and blob directories.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a device.
    #[error("read beyond end of device: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current device size.
        size: u64,
    },

    /// A write was attempted on a device opened read-only.
    #[error("device is read-only: {0}")]
    ReadOnly(PathBuf),

    /// A database path could not be mapped onto the file system.
    #[error("invalid resource path: {0}")]
    InvalidPath(String),

    /// The target of a create or move already exists.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The source of a read or move does not exist.
    #[error("not found: {0}")]
    NotFound(PathBuf),
}

impl StorageError {
    /// Returns true if the error means a file or directory was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
