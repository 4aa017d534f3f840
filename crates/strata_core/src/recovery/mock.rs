//! In-memory recovery target for unit tests.

use super::target::RecoveryTarget;
use crate::error::{CoreError, CoreResult};
use crate::types::{CollectionId, DocId, Node, NodeId, PageNum};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct MemoryTarget {
    binaries: BTreeMap<String, Vec<u8>>,
    backups: BTreeMap<String, Vec<u8>>,
    nodes: BTreeMap<(PageNum, NodeId), Node>,
    next_ids: BTreeMap<CollectionId, DocId>,
    documents: BTreeMap<(CollectionId, DocId), String>,
    pub(crate) syncs: usize,
    pub(crate) discards: usize,
}

impl MemoryTarget {
    pub(crate) fn put_binary(&mut self, path: &str, data: &[u8]) {
        self.binaries.insert(path.to_string(), data.to_vec());
    }

    pub(crate) fn put_backup(&mut self, name: &str, data: &[u8]) {
        self.backups.insert(name.to_string(), data.to_vec());
    }

    pub(crate) fn binary(&self, path: &str) -> Option<&[u8]> {
        self.binaries.get(path).map(Vec::as_slice)
    }

    pub(crate) fn backup(&self, name: &str) -> Option<&[u8]> {
        self.backups.get(name).map(Vec::as_slice)
    }

    pub(crate) fn node(&self, page: PageNum, id: &NodeId) -> Option<&Node> {
        self.nodes.get(&(page, id.clone()))
    }

    pub(crate) fn node_count(&self, page: PageNum) -> usize {
        self.nodes.keys().filter(|(p, _)| *p == page).count()
    }

    pub(crate) fn next_doc_id(&self, collection: CollectionId) -> Option<DocId> {
        self.next_ids.get(&collection).copied()
    }

    pub(crate) fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Everything except the sync and discard counters.
    pub(crate) fn contents_eq(&self, other: &Self) -> bool {
        self.binaries == other.binaries
            && self.backups == other.backups
            && self.nodes == other.nodes
            && self.next_ids == other.next_ids
            && self.documents == other.documents
    }
}

impl RecoveryTarget for MemoryTarget {
    fn binary_exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.binaries.contains_key(path))
    }

    fn backup_exists(&self, backup: &str) -> CoreResult<bool> {
        Ok(self.backups.contains_key(backup))
    }

    fn move_binary_to_backup(&mut self, path: &str, backup: &str) -> CoreResult<()> {
        if self.backups.contains_key(backup) {
            return Err(CoreError::invalid_operation(format!("backup {backup} exists")));
        }
        let data = self
            .binaries
            .remove(path)
            .ok_or_else(|| CoreError::invalid_operation(format!("{path} not found")))?;
        self.backups.insert(backup.to_string(), data);
        Ok(())
    }

    fn restore_binary(&mut self, backup: &str, path: &str) -> CoreResult<()> {
        if self.binaries.contains_key(path) {
            return Err(CoreError::invalid_operation(format!("{path} exists")));
        }
        let data = self
            .backups
            .remove(backup)
            .ok_or_else(|| CoreError::invalid_operation(format!("backup {backup} not found")))?;
        self.binaries.insert(path.to_string(), data);
        Ok(())
    }

    fn delete_binary(&mut self, path: &str) -> CoreResult<()> {
        self.binaries.remove(path);
        Ok(())
    }

    fn insert_node(&mut self, page: PageNum, node_id: &NodeId, node: &Node) -> CoreResult<()> {
        self.nodes.insert((page, node_id.clone()), node.clone());
        Ok(())
    }

    fn delete_node(&mut self, page: PageNum, node_id: &NodeId) -> CoreResult<()> {
        self.nodes.remove(&(page, node_id.clone()));
        Ok(())
    }

    fn doc_id_counter(&self, collection: CollectionId) -> CoreResult<DocId> {
        Ok(self.next_ids.get(&collection).copied().unwrap_or(DocId(0)))
    }

    fn set_next_doc_id(&mut self, collection: CollectionId, doc_id: DocId) -> CoreResult<()> {
        if doc_id.0 == 0 {
            self.next_ids.remove(&collection);
        } else {
            self.next_ids.insert(collection, doc_id);
        }
        Ok(())
    }

    fn create_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()> {
        match self.documents.get(&(collection, doc_id)) {
            Some(existing) if existing == path => Ok(()),
            Some(existing) => Err(CoreError::invalid_operation(format!(
                "{doc_id} already maps to {existing}"
            ))),
            None => {
                self.documents.insert((collection, doc_id), path.to_string());
                Ok(())
            }
        }
    }

    fn delete_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()> {
        match self.documents.get(&(collection, doc_id)) {
            Some(existing) if existing != path => Err(CoreError::invalid_operation(format!(
                "{doc_id} maps to {existing}, not {path}"
            ))),
            _ => {
                self.documents.remove(&(collection, doc_id));
                Ok(())
            }
        }
    }

    fn sync(&mut self) -> CoreResult<()> {
        self.syncs += 1;
        Ok(())
    }

    fn discard_backups(&mut self) -> CoreResult<()> {
        self.discards += 1;
        self.backups.clear();
        Ok(())
    }
}
