//! Journal record types and payload serialization.

use super::codec::{PayloadReader, PayloadWriter};
use crate::error::{CoreError, CoreResult};
use crate::types::{CollectionId, DocId, Node, NodeId, PageNum, TxnId};

/// Type tag written first in every journal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Transaction start.
    TxnStart = 1,
    /// Transaction commit.
    TxnCommit = 2,
    /// Transaction abort.
    TxnAbort = 3,
    /// Checkpoint marker.
    Checkpoint = 4,
    /// A binary resource was created.
    CreateBinary = 16,
    /// A binary resource was moved to the backup area.
    RenameBinary = 17,
    /// An element node was stored.
    StoreElementNode = 32,
    /// A text node was stored.
    StoreTextNode = 33,
    /// An element subtree was deleted.
    DeleteElementNode = 34,
    /// A collection's next document id advanced.
    CollectionNextDocId = 48,
    /// A document entry was added to a collection.
    CollectionCreateDoc = 49,
    /// A document entry was removed from a collection.
    CollectionDeleteDoc = 50,
}

impl EntryType {
    /// Converts a byte to an entry type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::TxnStart),
            2 => Some(Self::TxnCommit),
            3 => Some(Self::TxnAbort),
            4 => Some(Self::Checkpoint),
            16 => Some(Self::CreateBinary),
            17 => Some(Self::RenameBinary),
            32 => Some(Self::StoreElementNode),
            33 => Some(Self::StoreTextNode),
            34 => Some(Self::DeleteElementNode),
            48 => Some(Self::CollectionNextDocId),
            49 => Some(Self::CollectionCreateDoc),
            50 => Some(Self::CollectionDeleteDoc),
            _ => None,
        }
    }

    /// Converts the entry type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the display name used in dumps and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TxnStart => "TxnStart",
            Self::TxnCommit => "TxnCommit",
            Self::TxnAbort => "TxnAbort",
            Self::Checkpoint => "Checkpoint",
            Self::CreateBinary => "CreateBinary",
            Self::RenameBinary => "RenameBinary",
            Self::StoreElementNode => "StoreElementNode",
            Self::StoreTextNode => "StoreTextNode",
            Self::DeleteElementNode => "DeleteElementNode",
            Self::CollectionNextDocId => "CollectionNextDocId",
            Self::CollectionCreateDoc => "CollectionCreateDoc",
            Self::CollectionDeleteDoc => "CollectionDeleteDoc",
        }
    }

    /// Returns true for records that change storage and so need redo/undo.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(
            self,
            Self::TxnStart | Self::TxnCommit | Self::TxnAbort | Self::Checkpoint
        )
    }
}

/// One logged event: a transaction boundary or a physical mutation.
///
/// Mutations carry both the new state and whatever is needed to reverse
/// them, so that redo and undo never consult anything but the record and
/// the current storage state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loggable {
    /// Start of a transaction.
    TxnStart {
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// Commit of a transaction.
    TxnCommit {
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// Abort of a transaction.
    TxnAbort {
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// Recovery never needs to look before this point.
    Checkpoint {
        /// ID allocated for the checkpoint.
        txn_id: TxnId,
    },

    /// A binary resource was created at `path`.
    CreateBinary {
        /// Transaction ID.
        txn_id: TxnId,
        /// Database path of the resource.
        path: String,
    },

    /// The binary at `path` was moved into the backup area as `backup`.
    RenameBinary {
        /// Transaction ID.
        txn_id: TxnId,
        /// Database path of the resource.
        path: String,
        /// Name of the backup file.
        backup: String,
    },

    /// An element node was stored.
    StoreElementNode {
        /// Transaction ID.
        txn_id: TxnId,
        /// Page holding the node.
        page: PageNum,
        /// Node id within the page.
        node_id: NodeId,
        /// Element name.
        name: String,
        /// Number of direct children.
        children: u32,
    },

    /// A text node was stored.
    StoreTextNode {
        /// Transaction ID.
        txn_id: TxnId,
        /// Page holding the node.
        page: PageNum,
        /// Node id within the page.
        node_id: NodeId,
        /// Text content.
        value: String,
    },

    /// An element and its descendants were deleted.
    DeleteElementNode {
        /// Transaction ID.
        txn_id: TxnId,
        /// Page holding the subtree.
        page: PageNum,
        /// Root of the deleted subtree.
        node_id: NodeId,
        /// Before-image of every removed node, in document order.
        removed: Vec<(NodeId, Node)>,
    },

    /// A collection's next document id moved from `previous` to `doc_id`.
    CollectionNextDocId {
        /// Transaction ID.
        txn_id: TxnId,
        /// Collection.
        collection: CollectionId,
        /// New counter value.
        doc_id: DocId,
        /// Counter value before the change.
        previous: DocId,
    },

    /// A document entry was added.
    CollectionCreateDoc {
        /// Transaction ID.
        txn_id: TxnId,
        /// Collection.
        collection: CollectionId,
        /// Document id.
        doc_id: DocId,
        /// Database path of the document.
        path: String,
    },

    /// A document entry was removed.
    CollectionDeleteDoc {
        /// Transaction ID.
        txn_id: TxnId,
        /// Collection.
        collection: CollectionId,
        /// Document id.
        doc_id: DocId,
        /// Database path of the document.
        path: String,
    },
}

impl Loggable {
    /// Returns the type tag.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::TxnStart { .. } => EntryType::TxnStart,
            Self::TxnCommit { .. } => EntryType::TxnCommit,
            Self::TxnAbort { .. } => EntryType::TxnAbort,
            Self::Checkpoint { .. } => EntryType::Checkpoint,
            Self::CreateBinary { .. } => EntryType::CreateBinary,
            Self::RenameBinary { .. } => EntryType::RenameBinary,
            Self::StoreElementNode { .. } => EntryType::StoreElementNode,
            Self::StoreTextNode { .. } => EntryType::StoreTextNode,
            Self::DeleteElementNode { .. } => EntryType::DeleteElementNode,
            Self::CollectionNextDocId { .. } => EntryType::CollectionNextDocId,
            Self::CollectionCreateDoc { .. } => EntryType::CollectionCreateDoc,
            Self::CollectionDeleteDoc { .. } => EntryType::CollectionDeleteDoc,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn txn_id(&self) -> TxnId {
        match self {
            Self::TxnStart { txn_id }
            | Self::TxnCommit { txn_id }
            | Self::TxnAbort { txn_id }
            | Self::Checkpoint { txn_id }
            | Self::CreateBinary { txn_id, .. }
            | Self::RenameBinary { txn_id, .. }
            | Self::StoreElementNode { txn_id, .. }
            | Self::StoreTextNode { txn_id, .. }
            | Self::DeleteElementNode { txn_id, .. }
            | Self::CollectionNextDocId { txn_id, .. }
            | Self::CollectionCreateDoc { txn_id, .. }
            | Self::CollectionDeleteDoc { txn_id, .. } => *txn_id,
        }
    }

    /// Returns true for records that change storage.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        self.entry_type().is_mutation()
    }

    /// Returns true for commit and abort.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TxnCommit { .. } | Self::TxnAbort { .. })
    }

    /// Short human-readable description of the payload.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::TxnStart { .. }
            | Self::TxnCommit { .. }
            | Self::TxnAbort { .. }
            | Self::Checkpoint { .. } => String::new(),
            Self::CreateBinary { path, .. } => path.clone(),
            Self::RenameBinary { path, backup, .. } => format!("{path} -> {backup}"),
            Self::StoreElementNode {
                page,
                node_id,
                name,
                children,
                ..
            } => format!("{page} node {node_id} <{name}> children={children}"),
            Self::StoreTextNode {
                page,
                node_id,
                value,
                ..
            } => format!("{page} node {node_id} {value:?}"),
            Self::DeleteElementNode {
                page,
                node_id,
                removed,
                ..
            } => format!("{page} node {node_id} ({} nodes)", removed.len()),
            Self::CollectionNextDocId {
                collection,
                doc_id,
                previous,
                ..
            } => format!("{collection} {previous} -> {doc_id}"),
            Self::CollectionCreateDoc {
                collection,
                doc_id,
                path,
                ..
            }
            | Self::CollectionDeleteDoc {
                collection,
                doc_id,
                path,
                ..
            } => format!("{collection} {doc_id} {path}"),
        }
    }

    /// Serializes the payload. The type tag and transaction id travel in
    /// the frame header and are not repeated here.
    ///
    /// # Errors
    ///
    /// Returns an error if a string field is longer than `u32::MAX`.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut w = PayloadWriter::new();
        match self {
            Self::TxnStart { .. }
            | Self::TxnCommit { .. }
            | Self::TxnAbort { .. }
            | Self::Checkpoint { .. } => {}
            Self::CreateBinary { path, .. } => {
                w.str(path)?;
            }
            Self::RenameBinary { path, backup, .. } => {
                w.str(path)?.str(backup)?;
            }
            Self::StoreElementNode {
                page,
                node_id,
                name,
                children,
                ..
            } => {
                w.u64(page.0).node_id(node_id).str(name)?.u32(*children);
            }
            Self::StoreTextNode {
                page,
                node_id,
                value,
                ..
            } => {
                w.u64(page.0).node_id(node_id).str(value)?;
            }
            Self::DeleteElementNode {
                page,
                node_id,
                removed,
                ..
            } => {
                let count = u32::try_from(removed.len())
                    .map_err(|_| CoreError::invalid_format("too many removed nodes"))?;
                w.u64(page.0).node_id(node_id).u32(count);
                for (id, node) in removed {
                    w.node_id(id).node(node)?;
                }
            }
            Self::CollectionNextDocId {
                collection,
                doc_id,
                previous,
                ..
            } => {
                w.u32(collection.0).u64(doc_id.0).u64(previous.0);
            }
            Self::CollectionCreateDoc {
                collection,
                doc_id,
                path,
                ..
            }
            | Self::CollectionDeleteDoc {
                collection,
                doc_id,
                path,
                ..
            } => {
                w.u32(collection.0).u64(doc_id.0).str(path)?;
            }
        }
        Ok(w.finish())
    }

    /// Rebuilds a record from its frame header fields and payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is truncated, has trailing bytes, or
    /// holds invalid values.
    pub fn decode(entry_type: EntryType, txn_id: TxnId, payload: &[u8]) -> CoreResult<Self> {
        let mut r = PayloadReader::new(payload);
        let record = match entry_type {
            EntryType::TxnStart => Self::TxnStart { txn_id },
            EntryType::TxnCommit => Self::TxnCommit { txn_id },
            EntryType::TxnAbort => Self::TxnAbort { txn_id },
            EntryType::Checkpoint => Self::Checkpoint { txn_id },
            EntryType::CreateBinary => Self::CreateBinary {
                txn_id,
                path: r.string()?,
            },
            EntryType::RenameBinary => Self::RenameBinary {
                txn_id,
                path: r.string()?,
                backup: r.string()?,
            },
            EntryType::StoreElementNode => Self::StoreElementNode {
                txn_id,
                page: PageNum(r.u64()?),
                node_id: r.node_id()?,
                name: r.string()?,
                children: r.u32()?,
            },
            EntryType::StoreTextNode => Self::StoreTextNode {
                txn_id,
                page: PageNum(r.u64()?),
                node_id: r.node_id()?,
                value: r.string()?,
            },
            EntryType::DeleteElementNode => {
                let page = PageNum(r.u64()?);
                let node_id = r.node_id()?;
                let count = r.u32()? as usize;
                let mut removed = Vec::with_capacity(count.min(payload.len()));
                for _ in 0..count {
                    removed.push((r.node_id()?, r.node()?));
                }
                Self::DeleteElementNode {
                    txn_id,
                    page,
                    node_id,
                    removed,
                }
            }
            EntryType::CollectionNextDocId => Self::CollectionNextDocId {
                txn_id,
                collection: CollectionId(r.u32()?),
                doc_id: DocId(r.u64()?),
                previous: DocId(r.u64()?),
            },
            EntryType::CollectionCreateDoc => Self::CollectionCreateDoc {
                txn_id,
                collection: CollectionId(r.u32()?),
                doc_id: DocId(r.u64()?),
                path: r.string()?,
            },
            EntryType::CollectionDeleteDoc => Self::CollectionDeleteDoc {
                txn_id,
                collection: CollectionId(r.u32()?),
                doc_id: DocId(r.u64()?),
                path: r.string()?,
            },
        };
        r.finish()?;
        Ok(record)
    }
}
