//! The storage surface recovery applies effects to.

use crate::error::CoreResult;
use crate::types::{CollectionId, DocId, Node, NodeId, PageNum};

/// Storage operations that redo and undo are expressed in.
///
/// Implementations apply exactly what they are told. The existence checks
/// that make replay idempotent live in the recovery engine, so each method
/// has a narrow contract:
///
/// - `insert_node` replaces whatever is stored under the same id
/// - `delete_node` and `delete_binary` succeed when there is nothing to delete
/// - `create_document` succeeds if the same entry already exists and fails
///   if the id or path is taken by a different entry
/// - `delete_document` succeeds when the entry is absent and fails if the id
///   maps to a different path
/// - `move_binary_to_backup` and `restore_binary` fail if their source is
///   missing or their target is occupied
/// - `set_next_doc_id` with `DocId(0)` resets the counter
pub trait RecoveryTarget {
    /// Returns true if a binary resource exists at `path`.
    fn binary_exists(&self, path: &str) -> CoreResult<bool>;

    /// Returns true if the named backup exists.
    fn backup_exists(&self, backup: &str) -> CoreResult<bool>;

    /// Moves the binary at `path` into the backup area as `backup`.
    fn move_binary_to_backup(&mut self, path: &str, backup: &str) -> CoreResult<()>;

    /// Moves the named backup back to `path`.
    fn restore_binary(&mut self, backup: &str, path: &str) -> CoreResult<()>;

    /// Deletes the binary at `path`, if any.
    fn delete_binary(&mut self, path: &str) -> CoreResult<()>;

    /// Stores `node` at `node_id` in `page`.
    fn insert_node(&mut self, page: PageNum, node_id: &NodeId, node: &Node) -> CoreResult<()>;

    /// Removes the node at `node_id` in `page`, if any.
    fn delete_node(&mut self, page: PageNum, node_id: &NodeId) -> CoreResult<()>;

    /// Returns the document id a collection handed out last, or `DocId(0)`
    /// if it never handed one out.
    fn doc_id_counter(&self, collection: CollectionId) -> CoreResult<DocId>;

    /// Sets a collection's next document id.
    fn set_next_doc_id(&mut self, collection: CollectionId, doc_id: DocId) -> CoreResult<()>;

    /// Adds a document entry.
    fn create_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()>;

    /// Removes a document entry.
    fn delete_document(
        &mut self,
        collection: CollectionId,
        doc_id: DocId,
        path: &str,
    ) -> CoreResult<()>;

    /// Makes every applied effect durable. Called before a checkpoint.
    fn sync(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Drops binary backups once a checkpoint guarantees no undo needs them.
    fn discard_backups(&mut self) -> CoreResult<()> {
        Ok(())
    }
}
