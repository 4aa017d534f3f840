//! File header and entry framing.

use super::loggable::{EntryType, Loggable};
use crate::error::{CoreError, CoreResult};
use crate::types::TxnId;

/// Magic bytes at the start of every journal file.
pub const JOURNAL_MAGIC: [u8; 4] = *b"STJL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// File header size: magic (4) + version (2).
pub const FILE_HEADER_LEN: usize = 6;

/// Entry header size: type (1) + txn id (8) + payload length (4).
pub const ENTRY_HEADER_LEN: usize = 13;

/// Entry trailer size: back link (4) + crc32 (4).
pub const ENTRY_TRAILER_LEN: usize = 8;

/// Largest payload a single entry may carry.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Returns the file header bytes.
#[must_use]
pub fn file_header() -> [u8; FILE_HEADER_LEN] {
    let mut header = [0u8; FILE_HEADER_LEN];
    header[..4].copy_from_slice(&JOURNAL_MAGIC);
    header[4..].copy_from_slice(&JOURNAL_VERSION.to_le_bytes());
    header
}

/// Checks a file header.
///
/// # Errors
///
/// Returns an error on a magic or version mismatch.
pub fn check_file_header(header: &[u8; FILE_HEADER_LEN]) -> CoreResult<()> {
    if header[..4] != JOURNAL_MAGIC {
        return Err(CoreError::invalid_format("not a journal file (bad magic)"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != JOURNAL_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported journal version {version} (expected {JOURNAL_VERSION})"
        )));
    }
    Ok(())
}

/// Serializes a record into a complete frame.
///
/// ```text
/// | type u8 | txn u64 | len u32 | payload | back_link u32 | crc32 u32 |
/// ```
///
/// `back_link` is the total frame length; the checksum covers everything
/// before it.
///
/// # Errors
///
/// Returns [`CoreError::RecordTooLarge`] if the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
pub fn encode_frame(record: &Loggable) -> CoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CoreError::RecordTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let total = ENTRY_HEADER_LEN + payload.len() + ENTRY_TRAILER_LEN;

    let mut frame = Vec::with_capacity(total);
    frame.push(record.entry_type().as_byte());
    frame.extend_from_slice(&record.txn_id().as_u64().to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&(total as u32).to_le_bytes());
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// The fixed-size start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type byte; validated later so that a bad tag on a torn tail
    /// can still be told apart from mid-file corruption.
    pub type_byte: u8,
    /// Transaction id.
    pub txn_id: TxnId,
    /// Payload length.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parses the first [`ENTRY_HEADER_LEN`] bytes of a frame.
    #[must_use]
    pub fn parse(bytes: &[u8; ENTRY_HEADER_LEN]) -> Self {
        let mut txn = [0u8; 8];
        txn.copy_from_slice(&bytes[1..9]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[9..13]);
        Self {
            type_byte: bytes[0],
            txn_id: TxnId(u64::from_le_bytes(txn)),
            payload_len: u32::from_le_bytes(len),
        }
    }

    /// Total frame length including header and trailer.
    #[must_use]
    pub fn frame_len(&self) -> u64 {
        (ENTRY_HEADER_LEN + ENTRY_TRAILER_LEN) as u64 + u64::from(self.payload_len)
    }
}

/// Why a complete frame failed validation.
#[derive(Debug)]
pub(crate) enum FrameFault {
    Checksum { expected: u32, actual: u32 },
    Malformed(String),
}

/// Validates a complete frame and decodes its record.
pub(crate) fn decode_frame(frame: &[u8]) -> Result<Loggable, FrameFault> {
    if frame.len() < ENTRY_HEADER_LEN + ENTRY_TRAILER_LEN {
        return Err(FrameFault::Malformed("frame shorter than header".into()));
    }
    let crc_at = frame.len() - 4;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&frame[crc_at..]);
    let expected = u32::from_le_bytes(stored);
    let actual = crc32fast::hash(&frame[..crc_at]);
    if expected != actual {
        return Err(FrameFault::Checksum { expected, actual });
    }

    let mut link = [0u8; 4];
    link.copy_from_slice(&frame[crc_at - 4..crc_at]);
    if u32::from_le_bytes(link) as usize != frame.len() {
        return Err(FrameFault::Malformed("back link does not match frame length".into()));
    }

    let mut head = [0u8; ENTRY_HEADER_LEN];
    head.copy_from_slice(&frame[..ENTRY_HEADER_LEN]);
    let header = FrameHeader::parse(&head);
    let entry_type = EntryType::from_byte(header.type_byte).ok_or_else(|| {
        FrameFault::Malformed(format!("unknown entry type {:#04x}", header.type_byte))
    })?;
    let payload = &frame[ENTRY_HEADER_LEN..crc_at - 4];
    Loggable::decode(entry_type, header.txn_id, payload)
        .map_err(|e| FrameFault::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_checks() {
        assert!(check_file_header(&file_header()).is_ok());

        let mut bad_magic = file_header();
        bad_magic[0] = b'X';
        assert!(check_file_header(&bad_magic).is_err());

        let mut bad_version = file_header();
        bad_version[4] = 99;
        assert!(check_file_header(&bad_version).is_err());
    }

    #[test]
    fn frame_layout() {
        let record = Loggable::CreateBinary {
            txn_id: TxnId(5),
            path: "/db/a".into(),
        };
        let frame = encode_frame(&record).unwrap();
        let payload_len = 4 + 5;
        assert_eq!(frame.len(), ENTRY_HEADER_LEN + payload_len + ENTRY_TRAILER_LEN);
        assert_eq!(frame[0], EntryType::CreateBinary.as_byte());

        let mut head = [0u8; ENTRY_HEADER_LEN];
        head.copy_from_slice(&frame[..ENTRY_HEADER_LEN]);
        let header = FrameHeader::parse(&head);
        assert_eq!(header.txn_id, TxnId(5));
        assert_eq!(header.payload_len as usize, payload_len);
        assert_eq!(header.frame_len(), frame.len() as u64);

        assert_eq!(decode_frame(&frame).unwrap(), record);
    }

    #[test]
    fn flipped_bit_is_a_checksum_fault() {
        let mut frame = encode_frame(&Loggable::TxnStart { txn_id: TxnId(1) }).unwrap();
        frame[3] ^= 0x10;
        assert!(matches!(decode_frame(&frame), Err(FrameFault::Checksum { .. })));
    }
}
