//! The journal: a write-ahead log of transaction boundaries and physical
//! storage mutations.
//!
//! Every change to collections, node pages and binary resources is written
//! here before it is applied. On restart the recovery engine replays the
//! log from the last checkpoint, across as many files as that spans, to
//! bring storage back to a consistent state.
//!
//! ## File Format
//!
//! Files are named by a ten-hex-digit number plus `.log`. Each starts with a
//! header and then holds a contiguous run of frames:
//!
//! ```text
//! header: | magic "STJL" (4) | version (2) |
//! frame:  | type (1) | txn (8) | len (4) | payload (len) | back_link (4) | crc32 (4) |
//! ```
//!
//! The back link is the frame's total length, so the last frame can be found
//! from the end of the file. The checksum covers type through back link.
//!
//! ## Rotation
//!
//! A checkpoint writes a `Checkpoint` record and syncs. If the file has grown
//! past `journal_size_min`, the journal moves to the next number and deletes
//! the old file: everything before a durable checkpoint is already reflected
//! in storage. A size minimum of zero rotates on every checkpoint.
//!
//! A forced switch through `JournalManager::flush` starts a new file without
//! a checkpoint and keeps the old one, which recovery then reads too.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (treated as end of log)
//!
//! - **Partial file header**: the crash hit while the file was being created
//! - **Partial frame**: fewer bytes remain than the frame header announces
//! - **Damaged final frame**: checksum, back link, tag or payload invalid on
//!   the last frame in the file
//!
//! A record that was never completely written was never durably committed,
//! so dropping it loses nothing that was acknowledged.
//!
//! ### Fatal
//!
//! - **Bad magic or version**: `JournalCorruption` at offset 0
//! - **Damaged frame followed by more data**: `ChecksumMismatch` or
//!   `JournalCorruption`
//! - **Payload length above `MAX_PAYLOAD_LEN`**: `JournalCorruption`, even
//!   at the end of the file
//!
//! ## Invariants
//!
//! - Files are **append-only**; frames are never rewritten
//! - Records of one transaction appear in the order their effects happened
//! - A commit record is flushed (and synced if configured) before `commit`
//!   returns
//! - At most one of commit and abort is written per transaction

mod codec;
pub mod dir;
pub mod frame;
mod loggable;
mod manager;
mod reader;
mod writer;

pub use dir::{file_name, find_last_file, list_files, parse_file_name, JournalDir, LOG_SUFFIX};
pub use frame::{encode_frame, FILE_HEADER_LEN, JOURNAL_MAGIC, JOURNAL_VERSION, MAX_PAYLOAD_LEN};
pub use loggable::{EntryType, Loggable};
pub use manager::JournalManager;
pub use reader::JournalReader;
pub use writer::Journal;
