//! File-backed log device.

use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log device stored in a single file.
///
/// Journal files are only ever created fresh ([`FileDevice::create_new`]) or
/// reopened as they are ([`FileDevice::open`], [`FileDevice::open_read_only`]).
/// A device never silently creates or truncates a file on open.
///
/// # Durability
///
/// - `flush()` pushes data to the OS
/// - `sync()` calls `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use strata_storage::{FileDevice, LogDevice};
/// use std::path::Path;
///
/// let mut device = FileDevice::create_new(Path::new("0000000000.log")).unwrap();
/// device.append(b"header").unwrap();
/// device.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: RwLock<File>,
    len: RwLock<u64>,
    writable: bool,
}

impl FileDevice {
    /// Creates a new, empty file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a file is already there.
    pub fn create_new(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            len: RwLock::new(0),
            writable: true,
        })
    }

    /// Opens an existing file for reading and appending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, true)
    }

    /// Opens an existing file for reading only.
    ///
    /// Appends and truncation fail with [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, false)
    }

    fn open_with(path: &Path, writable: bool) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            len: RwLock::new(len),
            writable,
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.path.clone()))
        }
    }
}

impl LogDevice for FileDevice {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.len.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.ensure_writable()?;
        let mut file = self.file.write();
        let mut len = self.len.write();

        let offset = *len;
        if data.is_empty() {
            return Ok(offset);
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *len += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.writable {
            self.file.write().flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.writable {
            self.file.write().sync_all()?;
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(*self.len.read())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        let file = self.file.write();
        let mut len = self.len.write();

        if new_len > *len {
            return Err(StorageError::ReadPastEnd {
                offset: new_len,
                len: 0,
                size: *len,
            });
        }
        file.set_len(new_len)?;
        file.sync_all()?;
        *len = new_len;
        Ok(())
    }
}
