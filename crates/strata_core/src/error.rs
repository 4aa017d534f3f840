//! Error types for Strata core.

use crate::types::TxnId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the journal, transaction manager and recovery.
///
/// None of these are recoverable in place: the component that sees one
/// stops, and startup refuses to complete if recovery returns one.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage device or blob directory error.
    #[error("storage error: {0}")]
    Storage(#[from] strata_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal file contains bytes that cannot be a torn tail.
    #[error("journal corruption in file {file} at offset {offset}: {message}")]
    JournalCorruption {
        /// Journal file number.
        file: u32,
        /// Offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A frame checksum did not match its contents.
    #[error("checksum mismatch in file {file} at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Journal file number.
        file: u32,
        /// Offset of the frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// A payload or header could not be decoded.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A record exceeds the maximum encodable payload.
    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge {
        /// Encoded payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// The journal has not been initialized or was shut down.
    #[error("journal is closed")]
    JournalClosed,

    /// Another process holds the journal directory lock.
    #[error("journal locked: another process has exclusive access")]
    JournalLocked,

    /// A transaction boundary rule was broken.
    #[error("transaction protocol violation for {txn}: {message}")]
    TransactionProtocol {
        /// The offending transaction.
        txn: TxnId,
        /// What was violated.
        message: String,
    },

    /// Redo or undo could not be applied.
    #[error("recovery failed: {message}")]
    Recovery {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(file: u32, offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            file,
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a transaction protocol error.
    pub fn protocol(txn: TxnId, message: impl Into<String>) -> Self {
        Self::TransactionProtocol {
            txn,
            message: message.into(),
        }
    }

    /// Creates a recovery error.
    pub fn recovery(message: impl Into<String>) -> Self {
        Self::Recovery {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
