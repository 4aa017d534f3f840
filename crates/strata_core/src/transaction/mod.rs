//! Transaction boundaries.
//!
//! Transactions here only frame log records: locking and isolation belong
//! to the storage layer. What this module guarantees is the shape of the
//! log for every transaction id:
//!
//! - `TxnStart` precedes every mutation of the transaction
//! - mutations precede the terminal record, if any
//! - at most one of `TxnCommit` and `TxnAbort` is ever written

mod manager;
mod state;

pub use manager::TransactionManager;
pub use state::{Txn, TxnState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::journal::{EntryType, JournalManager, JournalReader, Loggable};
    use crate::types::TxnId;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn manager(path: &Path) -> (Arc<JournalManager>, TransactionManager) {
        let journal = Arc::new(JournalManager::open(&Config::new(path)).unwrap());
        journal.initialize().unwrap();
        let tm = TransactionManager::new(Some(Arc::clone(&journal)), Arc::new(AtomicU64::new(1)));
        (journal, tm)
    }

    fn logged(journal: &JournalManager) -> Vec<Loggable> {
        journal.flush(false, false).unwrap();
        JournalReader::open(journal.journal_dir(), journal.last_file().unwrap())
            .unwrap()
            .map(|e| e.unwrap().1)
            .collect()
    }

    fn create(txn: &Txn<'_>, path: &str) -> Loggable {
        Loggable::CreateBinary {
            txn_id: txn.id(),
            path: path.into(),
        }
    }

    #[test]
    fn commit_writes_start_mutation_commit() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());

        let mut txn = tm.begin_transaction().unwrap();
        let id = txn.id();
        txn.journal(&create(&txn, "/db/test/LICENSE")).unwrap();
        assert_eq!(tm.operation_count(id), Some(1));
        assert_eq!(tm.operations(id).unwrap(), vec![create(&txn, "/db/test/LICENSE")]);
        txn.commit().unwrap();
        txn.close();

        let kinds: Vec<_> = logged(&journal).iter().map(Loggable::entry_type).collect();
        assert_eq!(
            kinds,
            vec![EntryType::TxnStart, EntryType::CreateBinary, EntryType::TxnCommit]
        );
        assert!(tm.is_idle());
    }

    #[test]
    fn close_without_commit_writes_no_terminal_record() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());
        {
            let txn = tm.begin_transaction().unwrap();
            txn.journal(&create(&txn, "/db/a")).unwrap();
            assert!(tm.abandoned_transactions().is_empty());
        }
        assert!(!tm.is_idle());
        assert_eq!(tm.active_count(), 1);
        assert_eq!(tm.abandoned_transactions().len(), 1);
        assert!(logged(&journal).iter().all(|r| !r.is_terminal()));
    }

    #[test]
    fn second_terminal_record_is_refused() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());

        let mut committed = tm.begin_transaction().unwrap();
        committed.commit().unwrap();
        assert!(matches!(committed.commit(), Err(CoreError::TransactionProtocol { .. })));
        assert!(matches!(committed.abort(), Err(CoreError::TransactionProtocol { .. })));

        let mut aborted = tm.begin_transaction().unwrap();
        aborted.abort().unwrap();
        assert!(matches!(aborted.commit(), Err(CoreError::TransactionProtocol { .. })));
        assert!(matches!(aborted.abort(), Err(CoreError::TransactionProtocol { .. })));

        let terminals = logged(&journal).iter().filter(|r| r.is_terminal()).count();
        assert_eq!(terminals, 2);
    }

    #[test]
    fn aborted_transaction_stays_registered_until_rolled_back() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());

        let mut aborted = tm.begin_transaction().unwrap();
        let id = aborted.id();
        aborted.journal(&create(&aborted, "/db/a")).unwrap();
        let open = tm.begin_transaction().unwrap();
        aborted.abort().unwrap();
        drop(aborted);

        assert_eq!(tm.pending_rollbacks(), vec![id]);
        assert_eq!(tm.active_transactions(), vec![id, open.id()]);
        assert_eq!(tm.checkpoint(false).unwrap(), None);
        assert!(!logged(&journal)
            .iter()
            .any(|r| r.entry_type() == EntryType::Checkpoint));

        tm.rolled_back(open.id());
        assert_eq!(tm.active_count(), 2);
        tm.rolled_back(id);
        assert!(tm.pending_rollbacks().is_empty());
        assert_eq!(tm.active_transactions(), vec![open.id()]);
        assert!(tm.checkpoint(false).unwrap().is_some());
    }

    #[test]
    fn journal_rejects_misuse() {
        let tmp = tempdir().unwrap();
        let (_journal, tm) = manager(tmp.path());
        let mut txn = tm.begin_transaction().unwrap();

        let foreign = Loggable::CreateBinary {
            txn_id: TxnId(txn.id().0 + 100),
            path: "/db/x".into(),
        };
        assert!(txn.journal(&foreign).is_err());
        assert!(txn
            .journal(&Loggable::TxnCommit { txn_id: txn.id() })
            .is_err());

        txn.commit().unwrap();
        let late = create(&txn, "/db/y");
        assert!(matches!(
            txn.journal(&late),
            Err(CoreError::TransactionProtocol { .. })
        ));
    }

    #[test]
    fn ids_come_from_injected_counter() {
        let tmp = tempdir().unwrap();
        let journal = Arc::new(JournalManager::open(&Config::new(tmp.path())).unwrap());
        journal.initialize().unwrap();
        let counter = Arc::new(AtomicU64::new(40));
        let tm = TransactionManager::new(Some(journal), Arc::clone(&counter));

        assert_eq!(tm.begin_transaction().unwrap().id(), TxnId(40));
        assert_eq!(tm.begin_transaction().unwrap().id(), TxnId(41));
        assert_eq!(tm.peek_next_txn_id(), TxnId(42));

        let other = TransactionManager::new(None, Arc::new(AtomicU64::new(1)));
        assert_eq!(other.begin_transaction().unwrap().id(), TxnId(1));
    }

    #[test]
    fn checkpoint_uses_fresh_id() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());
        let txn = tm.begin_transaction().unwrap();
        let id = txn.id();
        tm.checkpoint(false).unwrap();

        let records = logged(&journal);
        match records.last() {
            Some(Loggable::Checkpoint { txn_id }) => assert!(*txn_id > id),
            other => panic!("expected checkpoint, got {other:?}"),
        }
    }

    #[test]
    fn shutdown_checkpoints_only_when_idle() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());
        let txn = tm.begin_transaction().unwrap();
        tm.shutdown().unwrap();
        drop(txn);

        let file = journal.last_file().unwrap();
        let records: Vec<_> = JournalReader::open(tmp.path(), file)
            .unwrap()
            .map(|e| e.unwrap().1)
            .collect();
        assert!(!matches!(records.last(), Some(Loggable::Checkpoint { .. })));
    }

    #[test]
    fn concurrent_transactions_keep_their_order() {
        let tmp = tempdir().unwrap();
        let (journal, tm) = manager(tmp.path());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..25 {
                        let mut txn = tm.begin_transaction().unwrap();
                        txn.journal(&create(&txn, &format!("/db/c/{i}"))).unwrap();
                        txn.journal(&create(&txn, &format!("/db/d/{i}"))).unwrap();
                        if i % 5 == 0 {
                            txn.abort().unwrap();
                        } else {
                            txn.commit().unwrap();
                        }
                    }
                });
            }
        });

        let mut per_txn: HashMap<TxnId, Vec<EntryType>> = HashMap::new();
        for record in logged(&journal) {
            per_txn
                .entry(record.txn_id())
                .or_default()
                .push(record.entry_type());
        }
        assert_eq!(per_txn.len(), 100);
        for kinds in per_txn.values() {
            assert_eq!(kinds.len(), 4);
            assert_eq!(kinds[0], EntryType::TxnStart);
            assert_eq!(&kinds[1..3], &[EntryType::CreateBinary, EntryType::CreateBinary]);
            assert!(matches!(kinds[3], EntryType::TxnCommit | EntryType::TxnAbort));
        }
    }
}
