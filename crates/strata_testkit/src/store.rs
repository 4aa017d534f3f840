//! Reference document store.
//!
//! A small storage layer that speaks the journal protocol the way a real
//! one does: every mutation is logged through the transaction first and
//! then applied through the same redo path recovery uses, so the live code
//! path and the recovery code path cannot drift apart.
//!
//! Layout under the data directory:
//!
//! ```text
//! store.json      pages, document entries and id counters, written on sync
//! fs/             binary documents, one file per database path
//! fs.journal/     backups of replaced or deleted binaries
//! ```
//!
//! Everything in `store.json` is lost on a crash unless it was synced;
//! blobs reach the disk immediately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use strata_core::recovery::redo;
use strata_core::{
    CollectionId, CoreError, CoreResult, DocId, Loggable, Node, NodeId, PageNum, RecoveryTarget,
    Txn,
};
use strata_storage::BlobDir;
use tracing::debug;

/// Name of the snapshot file.
pub const STORE_FILE: &str = "store.json";

/// Directory holding binary documents.
pub const BLOB_DIR: &str = "fs";

/// Directory holding binary backups.
pub const BACKUP_DIR: &str = "fs.journal";

/// An XML tree of elements and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// An element and its children in order.
    Element {
        /// Element name.
        name: String,
        /// Child nodes.
        children: Vec<Fragment>,
    },
    /// Character data.
    Text(String),
}

impl Fragment {
    /// Builds an element.
    pub fn element(name: impl Into<String>, children: impl IntoIterator<Item = Fragment>) -> Self {
        Self::Element {
            name: name.into(),
            children: children.into_iter().collect(),
        }
    }

    /// Builds a text node.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Renders the tree as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_string()
    }

    /// Returns the number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Element { children, .. } => 1 + children.iter().map(Self::node_count).sum::<usize>(),
            Self::Text(_) => 1,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element { name, children } if children.is_empty() => write!(f, "<{name}/>"),
            Self::Element { name, children } => {
                write!(f, "<{name}>")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{name}>")
            }
            Self::Text(value) => {
                for c in value.chars() {
                    match c {
                        '&' => f.write_str("&amp;")?,
                        '<' => f.write_str("&lt;")?,
                        '>' => f.write_str("&gt;")?,
                        c => write!(f, "{c}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// The page holding a document's nodes.
#[must_use]
pub fn page_of(collection: CollectionId, doc_id: DocId) -> PageNum {
    PageNum((u64::from(collection.0) << 32) | (doc_id.0 & 0xFFFF_FFFF))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredNode {
    Element { name: String, children: u32 },
    Text { value: String },
}

impl From<&Node> for StoredNode {
    fn from(node: &Node) -> Self {
        match node {
            Node::Element { name, children } => Self::Element {
                name: name.clone(),
                children: *children,
            },
            Node::Text { value } => Self::Text {
                value: value.clone(),
            },
        }
    }
}

impl From<StoredNode> for Node {
    fn from(node: StoredNode) -> Self {
        match node {
            StoredNode::Element { name, children } => Node::Element { name, children },
            StoredNode::Text { value } => Node::Text { value },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    collection: u32,
    doc_id: u64,
    path: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    pages: BTreeMap<u64, BTreeMap<String, StoredNode>>,
    #[serde(default)]
    documents: Vec<StoredDocument>,
    #[serde(default)]
    doc_counters: BTreeMap<u32, u64>,
}

/// A document store backed by a JSON snapshot and a blob directory.
#[derive(Debug)]
pub struct DocumentStore {
    data_dir: PathBuf,
    blobs: BlobDir,
    pages: BTreeMap<PageNum, BTreeMap<NodeId, Node>>,
    documents: BTreeMap<CollectionId, BTreeMap<DocId, String>>,
    /// Per collection, the document id handed out most recently.
    doc_counters: BTreeMap<CollectionId, DocId>,
    syncs: u64,
}

impl DocumentStore {
    /// Opens the store in `data_dir`, loading the last synced snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or the
    /// snapshot cannot be parsed.
    pub fn open(data_dir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(data_dir)?;
        let blobs = BlobDir::open(&data_dir.join(BLOB_DIR), &data_dir.join(BACKUP_DIR))?;
        let mut store = Self {
            data_dir: data_dir.to_path_buf(),
            blobs,
            pages: BTreeMap::new(),
            documents: BTreeMap::new(),
            doc_counters: BTreeMap::new(),
            syncs: 0,
        };

        let snapshot_path = data_dir.join(STORE_FILE);
        if snapshot_path.exists() {
            let bytes = fs::read(&snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                CoreError::invalid_format(format!("{}: {e}", snapshot_path.display()))
            })?;
            store.load(snapshot)?;
        }
        Ok(store)
    }

    fn load(&mut self, snapshot: Snapshot) -> CoreResult<()> {
        for (page, nodes) in snapshot.pages {
            let mut loaded = BTreeMap::new();
            for (id, node) in nodes {
                loaded.insert(id.parse::<NodeId>()?, Node::from(node));
            }
            self.pages.insert(PageNum(page), loaded);
        }
        for doc in snapshot.documents {
            self.documents
                .entry(CollectionId(doc.collection))
                .or_default()
                .insert(DocId(doc.doc_id), doc.path);
        }
        for (collection, doc_id) in snapshot.doc_counters {
            self.doc_counters.insert(CollectionId(collection), DocId(doc_id));
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pages: self
                .pages
                .iter()
                .filter(|(_, nodes)| !nodes.is_empty())
                .map(|(page, nodes)| {
                    let nodes = nodes
                        .iter()
                        .map(|(id, node)| (id.to_string(), StoredNode::from(node)))
                        .collect();
                    (page.0, nodes)
                })
                .collect(),
            documents: self
                .documents
                .iter()
                .flat_map(|(collection, docs)| {
                    docs.iter().map(move |(doc_id, path)| StoredDocument {
                        collection: collection.0,
                        doc_id: doc_id.0,
                        path: path.clone(),
                    })
                })
                .collect(),
            doc_counters: self
                .doc_counters
                .iter()
                .map(|(collection, doc_id)| (collection.0, doc_id.0))
                .collect(),
        }
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the blob directory.
    #[must_use]
    pub fn blobs(&self) -> &BlobDir {
        &self.blobs
    }

    /// Returns how many times the store has been synced since it was opened.
    #[must_use]
    pub fn sync_count(&self) -> u64 {
        self.syncs
    }

    /// Returns the total number of documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    /// Returns a collection's documents, by id.
    #[must_use]
    pub fn documents(&self, collection: CollectionId) -> Vec<(DocId, String)> {
        self.documents
            .get(&collection)
            .map(|docs| docs.iter().map(|(id, path)| (*id, path.clone())).collect())
            .unwrap_or_default()
    }

    /// Looks up a document by path.
    #[must_use]
    pub fn find(&self, collection: CollectionId, path: &str) -> Option<DocId> {
        self.documents
            .get(&collection)?
            .iter()
            .find(|(_, p)| p.as_str() == path)
            .map(|(id, _)| *id)
    }

    /// Returns the id most recently handed out in `collection`.
    #[must_use]
    pub fn last_doc_id(&self, collection: CollectionId) -> Option<DocId> {
        self.doc_counters.get(&collection).copied()
    }

    /// Returns the number of nodes stored on `page`.
    #[must_use]
    pub fn node_count(&self, page: PageNum) -> usize {
        self.pages.get(&page).map_or(0, BTreeMap::len)
    }

    /// Returns the number of nodes stored across all pages.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.pages.values().map(BTreeMap::len).sum()
    }

    /// Returns the backups currently held.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup area cannot be listed.
    pub fn backups(&self) -> CoreResult<Vec<String>> {
        Ok(self.blobs.backups()?)
    }

    fn log(&mut self, txn: &Txn<'_>, record: Loggable) -> CoreResult<()> {
        txn.journal(&record)?;
        redo(&record, self)
    }

    fn allocate_doc_id(&mut self, txn: &Txn<'_>, collection: CollectionId) -> CoreResult<DocId> {
        let previous = self.last_doc_id(collection).unwrap_or(DocId(0));
        let doc_id = DocId(previous.0 + 1);
        self.log(
            txn,
            Loggable::CollectionNextDocId {
                txn_id: txn.id(),
                collection,
                doc_id,
                previous,
            },
        )?;
        Ok(doc_id)
    }

    /// Removes the document at `path`, logging the removal under `txn`.
    fn remove_existing(
        &mut self,
        txn: &Txn<'_>,
        collection: CollectionId,
        path: &str,
    ) -> CoreResult<bool> {
        let Some(doc_id) = self.find(collection, path) else {
            return Ok(false);
        };
        let page = page_of(collection, doc_id);
        let removed: Vec<(NodeId, Node)> = self
            .pages
            .get(&page)
            .map(|nodes| nodes.iter().map(|(id, n)| (id.clone(), n.clone())).collect())
            .unwrap_or_default();

        if !removed.is_empty() {
            self.log(
                txn,
                Loggable::DeleteElementNode {
                    txn_id: txn.id(),
                    page,
                    node_id: NodeId::root(),
                    removed,
                },
            )?;
        }
        if self.blobs.exists(path)? {
            let record = Loggable::RenameBinary {
                txn_id: txn.id(),
                path: path.to_string(),
                backup: BlobDir::new_backup_name(),
            };
            txn.journal(&record)?;
            txn.flush()?;
            redo(&record, self)?;
        }
        self.log(
            txn,
            Loggable::CollectionDeleteDoc {
                txn_id: txn.id(),
                collection,
                doc_id,
                path: path.to_string(),
            },
        )?;
        Ok(true)
    }

    fn store_fragment(
        &mut self,
        txn: &Txn<'_>,
        page: PageNum,
        node_id: NodeId,
        fragment: &Fragment,
    ) -> CoreResult<()> {
        match fragment {
            Fragment::Element { name, children } => {
                let count = u32::try_from(children.len()).map_err(|_| {
                    CoreError::invalid_operation(format!("<{name}> has too many children"))
                })?;
                self.log(
                    txn,
                    Loggable::StoreElementNode {
                        txn_id: txn.id(),
                        page,
                        node_id: node_id.clone(),
                        name: name.clone(),
                        children: count,
                    },
                )?;
                for (n, child) in (1..=count).zip(children) {
                    self.store_fragment(txn, page, node_id.child(n), child)?;
                }
                Ok(())
            }
            Fragment::Text(value) => self.log(
                txn,
                Loggable::StoreTextNode {
                    txn_id: txn.id(),
                    page,
                    node_id,
                    value: value.clone(),
                },
            ),
        }
    }

    /// Stores an XML document at `path`, replacing any document there.
    ///
    /// Replacing logs the removal of the old document and the store of the
    /// new one in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be logged or applied.
    pub fn store_xml(
        &mut self,
        txn: &Txn<'_>,
        collection: CollectionId,
        path: &str,
        fragment: &Fragment,
    ) -> CoreResult<DocId> {
        let doc_id = self.allocate_doc_id(txn, collection)?;
        let replaced = self.remove_existing(txn, collection, path)?;
        let page = page_of(collection, doc_id);
        self.store_fragment(txn, page, NodeId::root(), fragment)?;
        self.log(
            txn,
            Loggable::CollectionCreateDoc {
                txn_id: txn.id(),
                collection,
                doc_id,
                path: path.to_string(),
            },
        )?;
        debug!(path, doc = %doc_id, replaced, nodes = fragment.node_count(), "stored xml document");
        Ok(doc_id)
    }

    /// Stores a binary document at `path`, replacing any document there.
    ///
    /// The old content is moved to the backup area, never overwritten in
    /// place. The new content is written and synced before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be logged or the file cannot be
    /// written.
    pub fn store_binary(
        &mut self,
        txn: &Txn<'_>,
        collection: CollectionId,
        path: &str,
        data: &[u8],
    ) -> CoreResult<DocId> {
        let doc_id = self.allocate_doc_id(txn, collection)?;
        let replaced = self.remove_existing(txn, collection, path)?;

        let record = Loggable::CreateBinary {
            txn_id: txn.id(),
            path: path.to_string(),
        };
        txn.journal(&record)?;
        txn.flush()?;
        self.blobs.write(path, data)?;

        self.log(
            txn,
            Loggable::CollectionCreateDoc {
                txn_id: txn.id(),
                collection,
                doc_id,
                path: path.to_string(),
            },
        )?;
        debug!(path, doc = %doc_id, replaced, bytes = data.len(), "stored binary document");
        Ok(doc_id)
    }

    /// Removes the document at `path`. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be logged or applied.
    pub fn remove_document(
        &mut self,
        txn: &Txn<'_>,
        collection: CollectionId,
        path: &str,
    ) -> CoreResult<bool> {
        let removed = self.remove_existing(txn, collection, path)?;
        debug!(path, removed, "removed document");
        Ok(removed)
    }

    /// Reads an XML document back as a tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the document's nodes are incomplete.
    pub fn read_xml(&self, collection: CollectionId, path: &str) -> CoreResult<Option<Fragment>> {
        let Some(doc_id) = self.find(collection, path) else {
            return Ok(None);
        };
        let page = page_of(collection, doc_id);
        match self.pages.get(&page) {
            Some(nodes) if !nodes.is_empty() => {
                Self::build(nodes, &NodeId::root(), path).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn build(nodes: &BTreeMap<NodeId, Node>, id: &NodeId, path: &str) -> CoreResult<Fragment> {
        match nodes.get(id) {
            Some(Node::Element { name, children }) => {
                let children = (1..=*children)
                    .map(|n| Self::build(nodes, &id.child(n), path))
                    .collect::<CoreResult<Vec<_>>>()?;
                Ok(Fragment::Element {
                    name: name.clone(),
                    children,
                })
            }
            Some(Node::Text { value }) => Ok(Fragment::Text(value.clone())),
            None => Err(CoreError::invalid_operation(format!(
                "{path} is missing node {id}"
            ))),
        }
    }

    /// Reads a binary document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_binary(&self, collection: CollectionId, path: &str) -> CoreResult<Option<Vec<u8>>> {
        if self.find(collection, path).is_none() || !self.blobs.exists(path)? {
            return Ok(None);
        }
        Ok(Some(self.blobs.read(path)?))
    }
}

impl RecoveryTarget for DocumentStore {
    fn binary_exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.blobs.exists(path)?)
    }

    fn backup_exists(&self, backup: &str) -> CoreResult<bool> {
        Ok(self.blobs.backup_exists(backup)?)
    }

    fn move_binary_to_backup(&mut self, path: &str, backup: &str) -> CoreResult<()> {
        Ok(self.blobs.move_to_backup(path, backup)?)
    }

    fn restore_binary(&mut self, backup: &str, path: &str) -> CoreResult<()> {
        Ok(self.blobs.restore_backup(backup, path)?)
    }

    fn delete_binary(&mut self, path: &str) -> CoreResult<()> {
        self.blobs.remove(path)?;
        Ok(())
    }

    fn insert_node(&mut self, page: PageNum, node_id: &NodeId, node: &Node) -> CoreResult<()> {
        self.pages
            .entry(page)
            .or_default()
            .insert(node_id.clone(), node.clone());
        Ok(())
    }

    fn delete_node(&mut self, page: PageNum, node_id: &NodeId) -> CoreResult<()> {
        if let Some(nodes) = self.pages.get_mut(&page) {
            nodes.remove(node_id);
            if nodes.is_empty() {
                self.pages.remove(&page);
            }
        }
        Ok(())
    }

    fn doc_id_counter(&self, collection: CollectionId) -> CoreResult<DocId> {
        Ok(self.last_doc_id(collection).unwrap_or(DocId(0)))
    }

    fn set_next_doc_id(&mut self, collection: CollectionId, doc_id: DocId) -> CoreResult<()> {
        if doc_id.0 == 0 {
            self.doc_counters.remove(&collection);
        } else {
            self.doc_counters.insert(collection, doc_id);
        }
        Ok(())
    }

    fn create_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()> {
        let docs = self.documents.entry(collection).or_default();
        if let Some(existing) = docs.get(&doc_id) {
            if existing == path {
                return Ok(());
            }
            return Err(CoreError::invalid_operation(format!(
                "{collection} {doc_id} already holds {existing}"
            )));
        }
        if let Some((other, _)) = docs.iter().find(|(_, p)| p.as_str() == path) {
            return Err(CoreError::invalid_operation(format!(
                "{path} is already stored as {other}"
            )));
        }
        docs.insert(doc_id, path.to_string());
        Ok(())
    }

    fn delete_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()> {
        let Some(docs) = self.documents.get_mut(&collection) else {
            return Ok(());
        };
        match docs.get(&doc_id) {
            Some(existing) if existing != path => Err(CoreError::invalid_operation(format!(
                "{collection} {doc_id} holds {existing}, not {path}"
            ))),
            Some(_) => {
                docs.remove(&doc_id);
                if docs.is_empty() {
                    self.documents.remove(&collection);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sync(&mut self) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| CoreError::invalid_format(format!("store snapshot: {e}")))?;
        let target = self.data_dir.join(STORE_FILE);
        let tmp = self.data_dir.join(format!("{STORE_FILE}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        self.syncs += 1;
        Ok(())
    }

    fn discard_backups(&mut self) -> CoreResult<()> {
        let removed = self.blobs.clear_backups()?;
        if removed > 0 {
            debug!(removed, "discarded binary backups");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Config, Database};
    use tempfile::tempdir;

    const COL: CollectionId = CollectionId(1);

    fn sample() -> Fragment {
        Fragment::element("element1", [Fragment::text("text1")])
    }

    #[test]
    fn fragment_renders_xml() {
        assert_eq!(sample().to_xml(), "<element1>text1</element1>");
        assert_eq!(Fragment::element("e", []).to_xml(), "<e/>");
        assert_eq!(Fragment::text("a<b & c").to_xml(), "a&lt;b &amp; c");
        assert_eq!(sample().node_count(), 2);
    }

    #[test]
    fn xml_round_trips_through_pages() {
        let tmp = tempdir().unwrap();
        let db = Database::open(Config::new(tmp.path()), DocumentStore::open(tmp.path()).unwrap())
            .unwrap();
        let doc = Fragment::element(
            "root",
            [
                Fragment::element("a", [Fragment::text("one")]),
                Fragment::text("two"),
                Fragment::element("b", []),
            ],
        );
        let mut txn = db.begin().unwrap();
        let doc_id = db
            .storage()
            .store_xml(&txn, COL, "/db/test/doc.xml", &doc)
            .unwrap();
        txn.commit().unwrap();

        let store = db.storage();
        assert_eq!(store.read_xml(COL, "/db/test/doc.xml").unwrap(), Some(doc));
        assert_eq!(store.node_count(page_of(COL, doc_id)), 5);
        assert_eq!(store.last_doc_id(COL), Some(doc_id));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let tmp = tempdir().unwrap();
        let mut store = DocumentStore::open(tmp.path()).unwrap();
        store
            .insert_node(PageNum(9), &NodeId::root(), &Node::Text { value: "x".into() })
            .unwrap();
        store.create_document(COL, DocId(3), "/db/test/x.xml").unwrap();
        store.set_next_doc_id(COL, DocId(3)).unwrap();
        store.sync().unwrap();
        drop(store);

        let store = DocumentStore::open(tmp.path()).unwrap();
        assert_eq!(store.node_count(PageNum(9)), 1);
        assert_eq!(store.find(COL, "/db/test/x.xml"), Some(DocId(3)));
        assert_eq!(store.last_doc_id(COL), Some(DocId(3)));
    }

    #[test]
    fn unsynced_changes_are_lost() {
        let tmp = tempdir().unwrap();
        let mut store = DocumentStore::open(tmp.path()).unwrap();
        store.create_document(COL, DocId(1), "/db/test/x.xml").unwrap();
        drop(store);
        assert_eq!(DocumentStore::open(tmp.path()).unwrap().document_count(), 0);
    }

    #[test]
    fn document_conflicts_are_rejected() {
        let tmp = tempdir().unwrap();
        let mut store = DocumentStore::open(tmp.path()).unwrap();
        store.create_document(COL, DocId(1), "/db/test/a").unwrap();
        store.create_document(COL, DocId(1), "/db/test/a").unwrap();
        assert!(store.create_document(COL, DocId(1), "/db/test/b").is_err());
        assert!(store.create_document(COL, DocId(2), "/db/test/a").is_err());
        assert!(store.delete_document(COL, DocId(1), "/db/test/b").is_err());
        store.delete_document(COL, DocId(1), "/db/test/a").unwrap();
        store.delete_document(COL, DocId(1), "/db/test/a").unwrap();
    }

    #[test]
    fn binary_replace_moves_old_content_to_backup() {
        let tmp = tempdir().unwrap();
        let db = Database::open(Config::new(tmp.path()), DocumentStore::open(tmp.path()).unwrap())
            .unwrap();
        let mut txn = db.begin().unwrap();
        db.storage().store_binary(&txn, COL, "/db/test/LICENSE", b"v1").unwrap();
        db.storage().store_binary(&txn, COL, "/db/test/LICENSE", b"v2").unwrap();
        txn.commit().unwrap();
        drop(txn);

        let store = db.storage();
        assert_eq!(store.read_binary(COL, "/db/test/LICENSE").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.backups().unwrap().len(), 1);
        assert_eq!(store.document_count(), 1);
    }
}
