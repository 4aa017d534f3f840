//! Identifier and position types.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;

/// Transaction identifier.
///
/// Allocated from a monotonically increasing counter owned by the
/// transaction manager. Never reused within one journal history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Creates a transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Log sequence number: where a record starts in the journal.
///
/// Ordering is by file number, then by byte offset within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lsn {
    /// Journal file number.
    pub file: u32,
    /// Byte offset of the record within the file.
    pub offset: u64,
}

impl Lsn {
    /// Sentinel for "no record".
    pub const INVALID: Lsn = Lsn { file: 0, offset: 0 };

    /// Creates an LSN.
    #[must_use]
    pub const fn new(file: u32, offset: u64) -> Self {
        Self { file, offset }
    }

    /// Returns true unless this is [`Lsn::INVALID`].
    ///
    /// Offset zero always holds the file header, so no record lives there.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.offset != 0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

/// Page number in the node store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNum(pub u64);

impl PageNum {
    /// Creates a page number.
    #[must_use]
    pub const fn new(page: u64) -> Self {
        Self(page)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Collection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a collection id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Document identifier, unique within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u64);

impl DocId {
    /// Creates a document id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Hierarchical node id.
///
/// The document element is `1`; its children are `1.1`, `1.2`, and so on.
/// Ids sort in document order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Vec<u32>);

impl NodeId {
    /// Deepest level a node id may have.
    pub const MAX_LEVELS: usize = u8::MAX as usize;

    /// The id of a document's root element.
    #[must_use]
    pub fn root() -> Self {
        Self(vec![1])
    }

    /// Builds an id from its levels.
    ///
    /// # Errors
    ///
    /// Returns an error if `levels` is empty, too deep, or contains zero.
    pub fn from_levels(levels: Vec<u32>) -> CoreResult<Self> {
        if levels.is_empty() || levels.len() > Self::MAX_LEVELS {
            return Err(CoreError::invalid_format(format!(
                "node id must have 1..={} levels, got {}",
                Self::MAX_LEVELS,
                levels.len()
            )));
        }
        if levels.contains(&0) {
            return Err(CoreError::invalid_format("node id levels start at 1"));
        }
        Ok(Self(levels))
    }

    /// Returns the id of the `n`th child (1-based).
    #[must_use]
    pub fn child(&self, n: u32) -> Self {
        let mut levels = self.0.clone();
        levels.push(n.max(1));
        Self(levels)
    }

    /// Returns the parent id, or `None` for a top-level node.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// Returns the raw levels.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.0
    }

    /// Returns true if `self` is `other` or one of its descendants.
    #[must_use]
    pub fn is_self_or_descendant_of(&self, other: &NodeId) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{level}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let levels = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| CoreError::invalid_format(format!("bad node id: {s}")))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Self::from_levels(levels)
    }
}

/// Contents of one node in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with a name and a child count.
    Element {
        /// Element name.
        name: String,
        /// Number of direct children.
        children: u32,
    },
    /// A text node.
    Text {
        /// Text content.
        value: String,
    },
}
