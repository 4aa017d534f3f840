//! Redo and undo of single records.
//!
//! Both directions are idempotent: applying a record's redo twice, or its
//! undo twice, leaves storage as a single application would. Recovery that
//! is itself interrupted can therefore simply run again.
//!
//! Binary records describe file operations that reached the disk before
//! recovery started, possibly already partly reversed by an earlier,
//! interrupted recovery. Undoing them needs one piece of context: the
//! previous binary record of the same transaction on the same path. See
//! [`undo_with_prior`].

use super::target::RecoveryTarget;
use crate::error::{CoreError, CoreResult};
use crate::journal::Loggable;
use crate::types::Node;
use std::collections::HashMap;
use tracing::trace;

/// Reapplies the effect of `record`.
///
/// # Errors
///
/// Returns [`CoreError::Recovery`] if storage contradicts the record, or
/// the target's own error.
pub fn redo<T: RecoveryTarget + ?Sized>(record: &Loggable, target: &mut T) -> CoreResult<()> {
    trace!(txn = %record.txn_id(), kind = record.entry_type().name(), "redo");
    match record {
        Loggable::TxnStart { .. }
        | Loggable::TxnCommit { .. }
        | Loggable::TxnAbort { .. }
        | Loggable::Checkpoint { .. } => Ok(()),

        // Content is written and synced before commit; nothing to replay.
        Loggable::CreateBinary { .. } => Ok(()),

        Loggable::RenameBinary { path, backup, .. } => {
            if target.backup_exists(backup)? {
                Ok(())
            } else if target.binary_exists(path)? {
                target.move_binary_to_backup(path, backup)
            } else {
                Err(CoreError::recovery(format!(
                    "redo rename: neither {path} nor backup {backup} exists"
                )))
            }
        }

        Loggable::StoreElementNode {
            page,
            node_id,
            name,
            children,
            ..
        } => target.insert_node(
            *page,
            node_id,
            &Node::Element {
                name: name.clone(),
                children: *children,
            },
        ),

        Loggable::StoreTextNode {
            page,
            node_id,
            value,
            ..
        } => target.insert_node(
            *page,
            node_id,
            &Node::Text {
                value: value.clone(),
            },
        ),

        Loggable::DeleteElementNode { page, removed, .. } => {
            for (id, _) in removed.iter().rev() {
                target.delete_node(*page, id)?;
            }
            Ok(())
        }

        Loggable::CollectionNextDocId {
            collection, doc_id, ..
        } => target.set_next_doc_id(*collection, *doc_id),

        Loggable::CollectionCreateDoc {
            collection,
            doc_id,
            path,
            ..
        } => target.create_document(*collection, *doc_id, path),

        Loggable::CollectionDeleteDoc {
            collection,
            doc_id,
            path,
            ..
        } => target.delete_document(*collection, *doc_id, path),
    }
}

/// Returns the path a binary record operates on.
#[must_use]
pub fn binary_path(record: &Loggable) -> Option<&str> {
    match record {
        Loggable::CreateBinary { path, .. } | Loggable::RenameBinary { path, .. } => Some(path),
        _ => None,
    }
}

/// Reverses the effect of `record`, with no earlier binary record of the
/// same transaction on the same path.
///
/// # Errors
///
/// Returns [`CoreError::Recovery`] if storage contradicts the record, or
/// the target's own error.
pub fn undo<T: RecoveryTarget + ?Sized>(record: &Loggable, target: &mut T) -> CoreResult<()> {
    undo_with_prior(record, None, target)
}

/// Reverses the effect of `record`.
///
/// `prior` is the previous binary record of the same transaction on the
/// same path, if any. It decides two cases that a file system state alone
/// cannot:
///
/// - `CreateBinary` after `RenameBinary { backup }`: if the backup is gone,
///   an earlier recovery already restored the older content to the path,
///   and it must be kept. Otherwise the file at the path is the one this
///   record created and is deleted.
/// - `RenameBinary` with neither path nor backup present is fatal, unless
///   the backup held content created by an earlier `CreateBinary` of the
///   same transaction; an earlier recovery already restored and deleted it.
///
/// # Errors
///
/// Returns [`CoreError::Recovery`] if storage contradicts the record, or
/// the target's own error.
pub fn undo_with_prior<T: RecoveryTarget + ?Sized>(
    record: &Loggable,
    prior: Option<&Loggable>,
    target: &mut T,
) -> CoreResult<()> {
    trace!(txn = %record.txn_id(), kind = record.entry_type().name(), "undo");
    match record {
        Loggable::TxnStart { .. }
        | Loggable::TxnCommit { .. }
        | Loggable::TxnAbort { .. }
        | Loggable::Checkpoint { .. } => Ok(()),

        Loggable::CreateBinary { path, .. } => match prior {
            Some(Loggable::RenameBinary { backup, .. }) if !target.backup_exists(backup)? => {
                trace!(path = %path, backup = %backup, "older content already restored");
                Ok(())
            }
            _ => target.delete_binary(path),
        },

        Loggable::RenameBinary { path, backup, .. } => {
            let has_backup = target.backup_exists(backup)?;
            let has_path = target.binary_exists(path)?;
            match (has_backup, has_path) {
                (true, false) => target.restore_binary(backup, path),
                (false, true) => Ok(()),
                (true, true) => Err(CoreError::recovery(format!(
                    "undo rename: {path} is occupied while backup {backup} still exists"
                ))),
                (false, false) if matches!(prior, Some(Loggable::CreateBinary { .. })) => Ok(()),
                (false, false) => Err(CoreError::recovery(format!(
                    "undo rename: neither {path} nor backup {backup} exists"
                ))),
            }
        }

        Loggable::StoreElementNode { page, node_id, .. }
        | Loggable::StoreTextNode { page, node_id, .. } => target.delete_node(*page, node_id),

        Loggable::DeleteElementNode { page, removed, .. } => {
            for (id, node) in removed {
                target.insert_node(*page, id, node)?;
            }
            Ok(())
        }

        // A later allocation by a committed transaction keeps its counter.
        Loggable::CollectionNextDocId {
            collection,
            doc_id,
            previous,
            ..
        } => {
            if target.doc_id_counter(*collection)? == *doc_id {
                target.set_next_doc_id(*collection, *previous)
            } else {
                trace!(collection = %collection, doc = %doc_id, "counter moved on; keeping it");
                Ok(())
            }
        }

        Loggable::CollectionCreateDoc {
            collection,
            doc_id,
            path,
            ..
        } => target.delete_document(*collection, *doc_id, path),

        Loggable::CollectionDeleteDoc {
            collection,
            doc_id,
            path,
            ..
        } => target.create_document(*collection, *doc_id, path),
    }
}

/// Undoes one transaction's mutations, newest first, and returns how many
/// were undone. `records` must be in log order.
///
/// # Errors
///
/// Stops at the first record that cannot be undone.
pub fn rollback<T: RecoveryTarget + ?Sized>(records: &[Loggable], target: &mut T) -> CoreResult<usize> {
    let mut last_on_path: HashMap<&str, &Loggable> = HashMap::new();
    let steps: Vec<(&Loggable, Option<&Loggable>)> = records
        .iter()
        .map(|record| {
            let prior = binary_path(record).and_then(|path| last_on_path.insert(path, record));
            (record, prior)
        })
        .collect();
    for (record, prior) in steps.iter().rev() {
        undo_with_prior(record, *prior, target)?;
    }
    Ok(steps.len())
}
