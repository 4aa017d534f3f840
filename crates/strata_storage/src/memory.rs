//! In-memory log device.

use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A log device held entirely in memory.
///
/// Used by reader tests that hand-craft journal bytes, and anywhere a
/// scratch journal is needed without touching disk.
///
/// ```rust
/// use strata_storage::{LogDevice, MemoryDevice};
///
/// let device = MemoryDevice::with_data(b"STJL".to_vec());
/// assert_eq!(device.len().unwrap(), 4);
/// ```
#[derive(Debug, Default)]
pub struct MemoryDevice {
    data: RwLock<Vec<u8>>,
}

impl MemoryDevice {
    /// Creates an empty device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogDevice for MemoryDevice {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_len > size {
            return Err(StorageError::ReadPastEnd {
                offset: new_len,
                len: 0,
                size,
            });
        }
        data.truncate(new_len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_device_is_empty() {
        let device = MemoryDevice::new();
        assert!(device.is_empty().unwrap());
    }

    #[test]
    fn read_past_end_is_rejected() {
        let device = MemoryDevice::with_data(vec![1, 2, 3]);
        assert!(matches!(
            device.read_at(2, 2),
            Err(StorageError::ReadPastEnd { offset: 2, len: 2, size: 3 })
        ));
        assert_eq!(device.read_at(3, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn truncate_keeps_prefix() {
        let mut device = MemoryDevice::with_data(b"abcdef".to_vec());
        device.truncate(2).unwrap();
        assert_eq!(device.data(), b"ab");
        assert!(device.truncate(3).is_err());
    }

    proptest! {
        #[test]
        fn appended_chunks_read_back_at_their_offsets(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16)
        ) {
            let mut device = MemoryDevice::new();
            let offsets: Vec<u64> = chunks
                .iter()
                .map(|c| device.append(c).unwrap())
                .collect();
            for (chunk, offset) in chunks.iter().zip(offsets) {
                prop_assert_eq!(&device.read_at(offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}
