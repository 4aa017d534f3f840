//! The active journal: buffering, flushing, rotation and checkpoints.

use super::dir::JournalDir;
use super::frame::{encode_frame, file_header};
use super::loggable::Loggable;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::types::{Lsn, TxnId};
use strata_storage::{FileDevice, LogDevice, StorageError};
use tracing::{debug, info, warn};

/// Append-only writer over numbered journal files.
///
/// A `Journal` is not thread-safe on its own; the journal manager wraps it in
/// the append lock so that appends, flushes, rotation and checkpoints are
/// mutually exclusive.
///
/// Frames are collected in an in-memory buffer and reach the file on
/// [`Journal::flush`], or earlier when the buffer fills up. Only synced bytes
/// are durable; anything still buffered at a crash is lost, which recovery
/// sees as a log that simply ends earlier.
pub struct Journal {
    dir: JournalDir,
    device: Option<FileDevice>,
    current_file: Option<u32>,
    buffer: Vec<u8>,
    buffer_size: usize,
    last_lsn: Lsn,
    synced_len: u64,
    journal_size_min: u64,
    journal_size_limit: u64,
    sync_on_commit: bool,
    closed: bool,
}

impl Journal {
    /// Creates a journal over a locked directory.
    ///
    /// No file is opened; call [`Journal::switch_files`] once recovery has
    /// finished with the existing files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be scanned.
    pub fn new(dir: JournalDir, config: &Config) -> CoreResult<Self> {
        let current_file = dir.last_file()?;
        Ok(Self {
            dir,
            device: None,
            current_file,
            buffer: Vec::with_capacity(config.buffer_size),
            buffer_size: config.buffer_size.max(1),
            last_lsn: Lsn::INVALID,
            synced_len: 0,
            journal_size_min: config.journal_size_min,
            journal_size_limit: config.journal_size_limit,
            sync_on_commit: config.sync_on_commit,
            closed: false,
        })
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn dir(&self) -> &JournalDir {
        &self.dir
    }

    /// Returns the number of the file being written, or the latest file on
    /// disk before the journal was initialized.
    #[must_use]
    pub fn current_file(&self) -> Option<u32> {
        self.current_file
    }

    /// Returns the LSN of the last record written.
    #[must_use]
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    /// Returns true once a file is open for writing.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.device.is_some() && !self.closed
    }

    /// Current file size including unflushed bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        let on_disk = self
            .device
            .as_ref()
            .and_then(|d| d.len().ok())
            .unwrap_or(0);
        on_disk + self.buffer.len() as u64
    }

    /// Returns the rotation threshold.
    #[must_use]
    pub fn journal_size_min(&self) -> u64 {
        self.journal_size_min
    }

    /// Changes the rotation threshold.
    pub fn set_journal_size_min(&mut self, bytes: u64) {
        self.journal_size_min = bytes;
    }

    /// Returns true if the file has reached the size that asks for a
    /// checkpoint.
    #[must_use]
    pub fn over_size_limit(&self) -> bool {
        self.is_open() && self.size() >= self.journal_size_limit
    }

    /// Appends a record to the buffer and returns its LSN.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] if no file is open, an encoding
    /// error, or an I/O error if the buffer had to be flushed.
    pub fn write(&mut self, record: &Loggable) -> CoreResult<Lsn> {
        if !self.is_open() {
            return Err(CoreError::JournalClosed);
        }
        let frame = encode_frame(record)?;
        if !self.buffer.is_empty() && self.buffer.len() + frame.len() > self.buffer_size {
            self.flush_buffer()?;
        }

        let file = self.current_file.ok_or(CoreError::JournalClosed)?;
        let lsn = Lsn::new(file, self.size());
        if frame.len() > self.buffer_size {
            // Oversized frames bypass the buffer.
            self.device_mut()?.append(&frame)?;
        } else {
            self.buffer.extend_from_slice(&frame);
        }
        self.last_lsn = lsn;
        Ok(lsn)
    }

    /// Writes buffered frames to the file.
    ///
    /// Syncs if `force_sync` is set, or if `fsync` is set and the journal is
    /// configured to sync on commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or sync fails. Durability of anything
    /// written so far cannot be assumed after an error.
    pub fn flush(&mut self, fsync: bool, force_sync: bool) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::JournalClosed);
        }
        self.flush_buffer()?;
        if force_sync || (fsync && self.sync_on_commit) {
            self.sync()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> CoreResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.buffer);
        let device = self.device_mut()?;
        device.append(&bytes)?;
        device.flush()?;
        self.buffer = bytes;
        self.buffer.clear();
        Ok(())
    }

    fn sync(&mut self) -> CoreResult<()> {
        let synced = self.synced_len;
        let device = self.device_mut()?;
        let len = device.len()?;
        if len > synced {
            device.sync()?;
            self.synced_len = len;
        }
        Ok(())
    }

    fn device_mut(&mut self) -> CoreResult<&mut FileDevice> {
        self.device.as_mut().ok_or(CoreError::JournalClosed)
    }

    /// Closes the current file and starts the next numbered one.
    ///
    /// The first call on a fresh journal starts the file after the latest
    /// one on disk (or file 0). If a file with the target name exists it is
    /// renamed to `<name>.bak` first. Returns the new file number.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal was shut down or an I/O error occurs.
    pub fn switch_files(&mut self) -> CoreResult<u32> {
        if self.closed {
            return Err(CoreError::JournalClosed);
        }
        if self.device.is_some() {
            self.flush(true, true)?;
        }

        let next = match self.current_file {
            Some(n) => n
                .checked_add(1)
                .ok_or_else(|| CoreError::invalid_operation("journal file numbers exhausted"))?,
            None => 0,
        };
        if let Some(backup) = self.dir.displace(next)? {
            warn!(
                file = next,
                backup = %backup.display(),
                "journal file already existed; moved aside"
            );
        }

        let path = self.dir.file_path(next);
        let mut device = FileDevice::create_new(&path).map_err(|e| match e {
            StorageError::AlreadyExists(p) => CoreError::invalid_operation(format!(
                "journal file appeared during switch: {}",
                p.display()
            )),
            other => other.into(),
        })?;
        device.append(&file_header())?;
        device.sync()?;
        self.dir.sync()?;

        self.synced_len = device.len()?;
        self.device = Some(device);
        self.current_file = Some(next);
        info!(file = next, path = %path.display(), "switched journal file");
        Ok(next)
    }

    /// Writes a checkpoint record and makes it durable.
    ///
    /// If `switch_files` is set and the current file is larger than the
    /// rotation threshold, a new file is started and the old one deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if writing, syncing or rotating fails.
    pub fn checkpoint(&mut self, txn_id: TxnId, switch_files: bool) -> CoreResult<Lsn> {
        let lsn = self.write(&Loggable::Checkpoint { txn_id })?;
        self.flush(true, true)?;
        debug!(%lsn, %txn_id, "checkpoint written");

        if switch_files && self.size() > self.journal_size_min {
            let previous = self.current_file;
            self.switch_files()?;
            if let Some(previous) = previous {
                self.dir.remove(previous)?;
                self.dir.sync()?;
            }
        }
        Ok(lsn)
    }

    /// Deletes every journal file numbered below `num`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn remove_files_before(&mut self, num: u32) -> CoreResult<usize> {
        let mut removed = 0;
        for file in self.dir.files()?.into_iter().filter(|f| *f < num) {
            if self.dir.remove(file)? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.dir.sync()?;
            debug!(removed, before = num, "removed old journal files");
        }
        Ok(removed)
    }

    /// Flushes, optionally writes a final checkpoint, and closes the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the final write or sync fails.
    pub fn shutdown(&mut self, checkpoint: Option<TxnId>) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.is_open() {
            if let Some(txn_id) = checkpoint {
                self.write(&Loggable::Checkpoint { txn_id })?;
            }
            self.flush(true, true)?;
        }
        self.device = None;
        self.closed = true;
        info!(file = ?self.current_file, clean = checkpoint.is_some(), "journal shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("dir", &self.dir.path())
            .field("current_file", &self.current_file)
            .field("buffered", &self.buffer.len())
            .field("last_lsn", &self.last_lsn)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
