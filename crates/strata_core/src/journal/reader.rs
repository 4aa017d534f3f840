//! Lazy, forward-only decoding of one journal file.

use super::dir::file_name;
use super::frame::{
    check_file_header, decode_frame, FrameFault, FrameHeader, ENTRY_HEADER_LEN, ENTRY_TRAILER_LEN,
    FILE_HEADER_LEN, MAX_PAYLOAD_LEN,
};
use super::loggable::Loggable;
use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use std::path::Path;
use strata_storage::{FileDevice, LogDevice};
use tracing::warn;

/// Read-ahead size; frames larger than this are fetched whole.
const READ_AHEAD: usize = 64 * 1024;

/// Decodes the records of one journal file in log order.
///
/// # Error Handling
///
/// - A file shorter than its header, or a frame cut short by end of file,
///   is a torn tail: iteration ends and [`JournalReader::torn_tail`] reports
///   where
/// - A complete frame that fails validation is also a torn tail when it is
///   the last thing in the file
/// - A frame header claiming more than [`MAX_PAYLOAD_LEN`] bytes is always
///   corruption
/// - The same failure anywhere else is corruption and yields an error
/// - After an error the reader yields nothing more
///
/// # Example
///
/// ```ignore
/// let mut reader = JournalReader::open(dir, 7)?;
/// for entry in &mut reader {
///     let (lsn, record) = entry?;
///     println!("{lsn} {}", record.entry_type().name());
/// }
/// ```
pub struct JournalReader<D> {
    device: D,
    file: u32,
    len: u64,
    pos: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    torn_tail: Option<u64>,
    finished: bool,
}

impl JournalReader<FileDevice> {
    /// Opens journal file `num` in `dir` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or its header is invalid.
    pub fn open(dir: &Path, num: u32) -> CoreResult<Self> {
        let device = FileDevice::open_read_only(&dir.join(file_name(num)))?;
        Self::new(device, num)
    }
}

impl<D: LogDevice> JournalReader<D> {
    /// Wraps a device holding journal file `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is present but invalid.
    pub fn new(device: D, file: u32) -> CoreResult<Self> {
        let len = device.len()?;
        let mut reader = Self {
            device,
            file,
            len,
            pos: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            torn_tail: None,
            finished: false,
        };

        if len == 0 {
            reader.finished = true;
        } else if len < FILE_HEADER_LEN as u64 {
            reader.mark_torn(0);
        } else {
            let mut header = [0u8; FILE_HEADER_LEN];
            header.copy_from_slice(reader.bytes_at(0, FILE_HEADER_LEN)?);
            check_file_header(&header)
                .map_err(|e| CoreError::journal_corruption(file, 0, e.to_string()))?;
            reader.pos = FILE_HEADER_LEN as u64;
        }
        Ok(reader)
    }

    /// Returns the journal file number.
    #[must_use]
    pub fn file(&self) -> u32 {
        self.file
    }

    /// Returns the file length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the file has no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset just past the last record decoded so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Offset where a torn tail was found, once iteration reached it.
    #[must_use]
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }

    fn bytes_at(&mut self, offset: u64, len: usize) -> CoreResult<&[u8]> {
        let end = offset + len as u64;
        let buffered_end = self.buffer_start + self.buffer.len() as u64;
        if offset < self.buffer_start || end > buffered_end {
            let available = self.len.saturating_sub(offset);
            let want = (len.max(READ_AHEAD) as u64).min(available) as usize;
            self.buffer = self.device.read_at(offset, want)?;
            self.buffer_start = offset;
        }
        let start = (offset - self.buffer_start) as usize;
        Ok(&self.buffer[start..start + len])
    }

    fn mark_torn(&mut self, offset: u64) {
        warn!(
            file = self.file,
            offset,
            dropped = self.len - offset,
            "torn journal tail; treating as end of log"
        );
        self.torn_tail = Some(offset);
        self.finished = true;
    }

    /// Decodes the next record.
    ///
    /// # Errors
    ///
    /// Returns an error on corruption that is not a torn tail, or on I/O
    /// failure.
    pub fn next_entry(&mut self) -> CoreResult<Option<(Lsn, Loggable)>> {
        if self.finished {
            return Ok(None);
        }
        let offset = self.pos;
        let remaining = self.len - offset;
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }
        if remaining < ENTRY_HEADER_LEN as u64 {
            self.mark_torn(offset);
            return Ok(None);
        }

        let mut head = [0u8; ENTRY_HEADER_LEN];
        head.copy_from_slice(self.bytes_at(offset, ENTRY_HEADER_LEN)?);
        let header = FrameHeader::parse(&head);
        // No writer produces this length, so it cannot be a torn tail.
        if header.payload_len as usize > MAX_PAYLOAD_LEN {
            self.finished = true;
            return Err(CoreError::journal_corruption(
                self.file,
                offset,
                format!("payload length {} exceeds maximum", header.payload_len),
            ));
        }
        let frame_len = header.frame_len();
        if frame_len > remaining {
            self.mark_torn(offset);
            return Ok(None);
        }

        match decode_frame(self.bytes_at(offset, frame_len as usize)?) {
            Ok(record) => {
                self.pos = offset + frame_len;
                Ok(Some((Lsn::new(self.file, offset), record)))
            }
            Err(_) if offset + frame_len == self.len => {
                self.mark_torn(offset);
                Ok(None)
            }
            Err(fault) => {
                self.finished = true;
                Err(match fault {
                    FrameFault::Checksum { expected, actual } => CoreError::ChecksumMismatch {
                        file: self.file,
                        offset,
                        expected,
                        actual,
                    },
                    FrameFault::Malformed(message) => {
                        CoreError::journal_corruption(self.file, offset, message)
                    }
                })
            }
        }
    }

    /// Reads the final record using the trailing back link, without a
    /// forward scan.
    ///
    /// Returns `None` if the file holds no records or its tail is torn;
    /// callers that need certainty fall back to iterating.
    ///
    /// # Errors
    ///
    /// Returns an error only on I/O failure.
    pub fn last_entry(&mut self) -> CoreResult<Option<(Lsn, Loggable)>> {
        let min_frame = (ENTRY_HEADER_LEN + ENTRY_TRAILER_LEN) as u64;
        if self.len < FILE_HEADER_LEN as u64 + min_frame {
            return Ok(None);
        }
        let mut link = [0u8; 4];
        link.copy_from_slice(self.bytes_at(self.len - ENTRY_TRAILER_LEN as u64, 4)?);
        let frame_len = u64::from(u32::from_le_bytes(link));
        if frame_len < min_frame || frame_len > self.len - FILE_HEADER_LEN as u64 {
            return Ok(None);
        }
        let start = self.len - frame_len;
        match decode_frame(self.bytes_at(start, frame_len as usize)?) {
            Ok(record) => Ok(Some((Lsn::new(self.file, start), record))),
            Err(_) => Ok(None),
        }
    }
}

impl<D: LogDevice> Iterator for JournalReader<D> {
    type Item = CoreResult<(Lsn, Loggable)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<D> std::fmt::Debug for JournalReader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("file", &self.file)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .field("torn_tail", &self.torn_tail)
            .finish_non_exhaustive()
    }
}
