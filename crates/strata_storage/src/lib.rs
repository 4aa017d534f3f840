//! # Strata Storage
//!
//! Byte-level storage primitives used by the Strata journal and by the
//! reference document store.
//!
//! Two concerns live here:
//!
//! - **Log devices**: append-only byte sequences that the journal writes its
//!   frames into and the journal reader decodes from. Devices are opaque; they
//!   know nothing about record framing or checksums.
//! - **Blob directories**: the on-disk home of binary resources, addressed by
//!   database path (`/db/collection/name`), with a sibling backup area that
//!   replace and delete operations move old content into instead of
//!   overwriting it in place.
//!
//! ## Available Devices
//!
//! - [`MemoryDevice`] - For tests and scratch journals
//! - [`FileDevice`] - One journal file on disk
//!
//! ## Example
//!
//! ```rust
//! use strata_storage::{LogDevice, MemoryDevice};
//!
//! let mut device = MemoryDevice::new();
//! let offset = device.append(b"frame").unwrap();
//! assert_eq!(device.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod device;
mod error;
mod file;
mod memory;

pub use blob::BlobDir;
pub use device::LogDevice;
pub use error::{StorageError, StorageResult};
pub use file::FileDevice;
pub use memory::MemoryDevice;
