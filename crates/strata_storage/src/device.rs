//! Log device trait definition.

use crate::error::StorageResult;

/// An append-only byte sequence holding one journal file.
///
/// Devices are **opaque**: the journal owns framing, checksums and the file
/// header. A device only promises that appended bytes can be read back at
/// the offset `append` returned, and that `sync` makes them durable.
///
/// # Invariants
///
/// - `append` returns the offset where the data starts
/// - `len` is the offset the next `append` will write at
/// - `read_at` never returns bytes past `len`
/// - After `sync` returns, everything appended so far survives a crash
pub trait LogDevice: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the end of the device, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data at the end and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is read-only or an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if nothing has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Cuts the device back to `len` bytes.
    ///
    /// Used to discard a torn tail, and by crash tests to simulate one.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is past the end, the device is read-only,
    /// or an I/O error occurs.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;
}
