//! Crash and restart scenarios against the reference store.

use strata_core::{Database, DocId, RecoveryManager, RecoveryTarget, TxnId};
use strata_testkit::prelude::*;

fn store_xml(db: &Database<DocumentStore>, name: &str, fragment: &Fragment, commit: bool) -> TxnId {
    let mut txn = db.begin().unwrap();
    let id = txn.id();
    db.storage()
        .store_xml(&txn, TEST_COLLECTION, &test_path(name), fragment)
        .unwrap();
    if commit {
        txn.commit().unwrap();
    }
    id
}

fn store_binary(db: &Database<DocumentStore>, name: &str, data: &[u8], commit: bool) -> TxnId {
    let mut txn = db.begin().unwrap();
    let id = txn.id();
    db.storage()
        .store_binary(&txn, TEST_COLLECTION, &test_path(name), data)
        .unwrap();
    if commit {
        txn.commit().unwrap();
    }
    id
}

fn remove(db: &Database<DocumentStore>, name: &str, commit: bool) -> TxnId {
    let mut txn = db.begin().unwrap();
    let id = txn.id();
    assert!(db
        .storage()
        .remove_document(&txn, TEST_COLLECTION, &test_path(name))
        .unwrap());
    if commit {
        txn.commit().unwrap();
    }
    id
}

fn binary(db: &Database<DocumentStore>, name: &str) -> Option<Vec<u8>> {
    db.storage()
        .read_binary(TEST_COLLECTION, &test_path(name))
        .unwrap()
}

fn xml(db: &Database<DocumentStore>, name: &str) -> Option<Fragment> {
    db.storage().read_xml(TEST_COLLECTION, &test_path(name)).unwrap()
}

fn assert_no_leftovers(db: &Database<DocumentStore>) {
    let store = db.storage();
    assert!(store.backups().unwrap().is_empty());
    assert_eq!(store.documents(TEST_COLLECTION).len(), store.document_count());
}

#[test]
fn test_committed_documents_survive_repeated_crashes() {
    let h = CrashHarness::new();
    let mut db = h.open();
    store_binary(&db, "LICENSE", &license_bytes(), true);
    store_xml(&db, "test.xml", &nested_xml(), true);
    store_xml(&db, "small.xml", &sample_xml(), true);

    for _ in 0..4 {
        db = h.restart(db);
        assert_eq!(binary(&db, "LICENSE"), Some(license_bytes()));
        assert_eq!(xml(&db, "test.xml"), Some(nested_xml()));
        assert_eq!(xml(&db, "small.xml"), Some(sample_xml()));
        assert_eq!(db.storage().document_count(), 3);
        assert_no_leftovers(&db);
    }
}

#[test]
fn test_first_restart_redoes_from_the_journal() {
    let h = CrashHarness::new();
    let db = h.open();
    let t = store_xml(&db, "test.xml", &sample_xml(), true);

    let db = h.restart(db);
    let report = db.recovery_report();
    assert!(!report.clean_shutdown);
    assert_eq!(report.committed, vec![t]);
    assert!(report.rolled_back.is_empty());
    assert_eq!(report.redone, 4);
    assert_eq!(report.undone, 0);

    // the second restart finds the checkpoint written by the first open
    let db = h.restart(db);
    assert!(db.recovery_report().clean_shutdown);
    assert_eq!(xml(&db, "test.xml"), Some(sample_xml()));
}

#[test]
fn test_work_before_a_forced_file_switch_survives_a_crash() {
    let h = CrashHarness::new();
    let db = h.open();
    let committed = store_xml(&db, "a.xml", &sample_xml(), true);
    let open = store_binary(&db, "LICENSE", &license_bytes(), false);
    db.journal_manager().unwrap().flush(true, true).unwrap();
    assert_eq!(h.env().journal_files(), vec![0, 1]);

    let db = h.restart(db);
    let report = db.recovery_report().clone();
    assert!(!report.clean_shutdown);
    assert_eq!(report.files, vec![0, 1]);
    assert_eq!(report.committed, vec![committed]);
    assert_eq!(report.rolled_back, vec![open]);
    assert_eq!(report.max_txn_id, Some(open));
    assert_eq!(xml(&db, "a.xml"), Some(sample_xml()));
    assert_eq!(binary(&db, "LICENSE"), None);
    assert_eq!(db.storage().document_count(), 1);
    assert_no_leftovers(&db);
    assert!(db.transaction_manager().peek_next_txn_id() > open);

    // the open checkpointed a fresh file and dropped the old ones
    assert_eq!(h.env().journal_files().len(), 1);
    let db = h.restart(db);
    assert!(db.recovery_report().clean_shutdown);
    assert_eq!(xml(&db, "a.xml"), Some(sample_xml()));
}

#[test]
fn test_uncommitted_binary_store_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    let t = store_binary(&db, "LICENSE", &license_bytes(), false);
    assert_eq!(binary(&db, "LICENSE"), Some(license_bytes()));

    let db = h.restart(db);
    assert_eq!(db.recovery_report().rolled_back, vec![t]);
    assert_eq!(binary(&db, "LICENSE"), None);
    assert!(!db.storage().blobs().exists(&test_path("LICENSE")).unwrap());
    assert_eq!(db.storage().document_count(), 0);
    assert_eq!(db.storage().last_doc_id(TEST_COLLECTION), None);

    store_binary(&db, "LICENSE", &license_bytes(), true);
    let db = h.restart(db);
    assert_eq!(binary(&db, "LICENSE"), Some(license_bytes()));
    assert_eq!(db.storage().find(TEST_COLLECTION, &test_path("LICENSE")), Some(DocId(1)));
    assert_no_leftovers(&db);
}

#[test]
fn test_uncommitted_binary_delete_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_binary(&db, "LICENSE", &license_bytes(), true);
    remove(&db, "LICENSE", false);
    assert_eq!(binary(&db, "LICENSE"), None);

    let db = h.restart(db);
    assert_eq!(db.recovery_report().rolled_back.len(), 1);
    assert_eq!(binary(&db, "LICENSE"), Some(license_bytes()));
    assert_no_leftovers(&db);

    remove(&db, "LICENSE", true);
    let db = h.restart(db);
    assert_eq!(binary(&db, "LICENSE"), None);
    assert_eq!(db.storage().document_count(), 0);
    assert_no_leftovers(&db);
}

#[test]
fn test_uncommitted_binary_replace_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_binary(&db, "LICENSE", b"version one", true);
    store_binary(&db, "LICENSE", b"version two", false);
    assert_eq!(binary(&db, "LICENSE"), Some(b"version two".to_vec()));

    let db = h.restart(db);
    assert_eq!(binary(&db, "LICENSE"), Some(b"version one".to_vec()));
    assert_eq!(db.storage().document_count(), 1);
    assert_eq!(db.storage().last_doc_id(TEST_COLLECTION), Some(DocId(1)));
    assert_no_leftovers(&db);

    store_binary(&db, "LICENSE", b"version two", true);
    let db = h.restart(db);
    assert_eq!(binary(&db, "LICENSE"), Some(b"version two".to_vec()));
    assert_eq!(db.storage().document_count(), 1);
}

#[test]
fn test_uncommitted_xml_store_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "test.xml", &nested_xml(), false);

    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), None);
    assert_eq!(db.storage().total_nodes(), 0);
    assert_eq!(db.storage().document_count(), 0);

    store_xml(&db, "test.xml", &nested_xml(), true);
    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), Some(nested_xml()));
    assert_eq!(db.storage().total_nodes(), nested_xml().node_count());
}

#[test]
fn test_uncommitted_xml_delete_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "test.xml", &nested_xml(), true);
    remove(&db, "test.xml", false);
    assert_eq!(xml(&db, "test.xml"), None);

    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), Some(nested_xml()));
    assert_eq!(db.storage().total_nodes(), nested_xml().node_count());

    remove(&db, "test.xml", true);
    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), None);
    assert_eq!(db.storage().total_nodes(), 0);
}

#[test]
fn test_uncommitted_xml_replace_is_rolled_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "test.xml", &sample_xml(), true);
    store_xml(&db, "test.xml", &nested_xml(), false);
    assert_eq!(xml(&db, "test.xml"), Some(nested_xml()));

    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), Some(sample_xml()));
    assert_eq!(db.storage().total_nodes(), sample_xml().node_count());
    assert_eq!(db.storage().last_doc_id(TEST_COLLECTION), Some(DocId(1)));

    store_xml(&db, "test.xml", &nested_xml(), true);
    let db = h.restart(db);
    assert_eq!(xml(&db, "test.xml"), Some(nested_xml()));
    assert_eq!(db.storage().total_nodes(), nested_xml().node_count());
}

#[test]
fn test_aborted_transaction_is_rolled_back_live_and_after_crash() {
    let h = CrashHarness::new();
    let db = h.open();
    store_binary(&db, "LICENSE", b"kept", true);

    let mut txn = db.begin().unwrap();
    db.storage()
        .store_binary(&txn, TEST_COLLECTION, &test_path("LICENSE"), b"dropped")
        .unwrap();
    db.storage()
        .store_xml(&txn, TEST_COLLECTION, &test_path("test.xml"), &sample_xml())
        .unwrap();
    db.abort(&mut txn).unwrap();
    drop(txn);

    assert_eq!(binary(&db, "LICENSE"), Some(b"kept".to_vec()));
    assert_eq!(xml(&db, "test.xml"), None);
    assert!(db.transaction_manager().is_idle());

    let db = h.restart(db);
    assert_eq!(db.recovery_report().rolled_back.len(), 1);
    assert_eq!(binary(&db, "LICENSE"), Some(b"kept".to_vec()));
    assert_eq!(xml(&db, "test.xml"), None);
    assert_no_leftovers(&db);
}

#[test]
fn test_abort_record_alone_is_rolled_back_after_clean_close() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "kept.xml", &nested_xml(), true);

    let mut txn = db.begin().unwrap();
    let t = txn.id();
    db.storage()
        .store_xml(&txn, TEST_COLLECTION, &test_path("b.xml"), &sample_xml())
        .unwrap();
    db.storage()
        .store_binary(&txn, TEST_COLLECTION, &test_path("LICENSE"), &license_bytes())
        .unwrap();
    txn.abort().unwrap();
    drop(txn);

    // still live, and no checkpoint may bury the abort record
    assert_eq!(xml(&db, "b.xml"), Some(sample_xml()));
    assert_eq!(db.transaction_manager().pending_rollbacks(), vec![t]);
    assert_eq!(db.checkpoint(false).unwrap(), None);

    let db = h.close_and_reopen(db);
    let report = db.recovery_report();
    assert!(!report.clean_shutdown);
    assert_eq!(report.rolled_back, vec![t]);
    assert_eq!(xml(&db, "b.xml"), None);
    assert_eq!(binary(&db, "LICENSE"), None);
    assert!(!db.storage().blobs().exists(&test_path("LICENSE")).unwrap());
    assert_eq!(xml(&db, "kept.xml"), Some(nested_xml()));
    assert_eq!(db.storage().document_count(), 1);
    assert_no_leftovers(&db);

    let db = h.close_and_reopen(db);
    assert!(db.recovery_report().clean_shutdown);
    assert_eq!(xml(&db, "b.xml"), None);
}

#[test]
fn test_close_with_abandoned_transaction_leaves_rollback_to_recovery() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "test.xml", &sample_xml(), false);

    let db = h.close_and_reopen(db);
    assert!(!db.recovery_report().clean_shutdown);
    assert_eq!(db.recovery_report().rolled_back.len(), 1);
    assert_eq!(xml(&db, "test.xml"), None);
    assert_eq!(db.storage().total_nodes(), 0);
}

#[test]
fn test_clean_close_needs_no_recovery() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "test.xml", &sample_xml(), true);
    store_binary(&db, "LICENSE", b"one", true);
    store_binary(&db, "LICENSE", b"two", true);

    let db = h.close_and_reopen(db);
    let report = db.recovery_report();
    assert!(report.clean_shutdown);
    assert_eq!(report.redone, 0);
    assert_eq!(xml(&db, "test.xml"), Some(sample_xml()));
    assert_eq!(binary(&db, "LICENSE"), Some(b"two".to_vec()));
    assert_no_leftovers(&db);
}

#[test]
fn test_replace_and_delete_of_binary_survive_repeated_and_interrupted_recovery() {
    let h = CrashHarness::new();
    let db = h.open();
    store_binary(&db, "LICENSE", b"v1", true);

    let txn = db.begin().unwrap();
    db.storage()
        .store_binary(&txn, TEST_COLLECTION, &test_path("LICENSE"), b"v2")
        .unwrap();
    db.storage()
        .remove_document(&txn, TEST_COLLECTION, &test_path("LICENSE"))
        .unwrap();
    drop(txn);
    assert_eq!(db.storage().backups().unwrap().len(), 2);
    CrashHarness::crash(db);

    // A recovery run whose store changes never reach the snapshot: only
    // the file moves it made remain.
    {
        let mut store = DocumentStore::open(h.env().path()).unwrap();
        let report = RecoveryManager::new(h.env().config().resolved_journal_dir())
            .recover(&mut store)
            .unwrap();
        assert_eq!(report.skipped, 3);
        assert_eq!(
            store.read_binary(TEST_COLLECTION, &test_path("LICENSE")).unwrap(),
            Some(b"v1".to_vec())
        );
        assert!(store.backups().unwrap().is_empty());
    }

    let mut db = h.open();
    for _ in 0..3 {
        assert_eq!(binary(&db, "LICENSE"), Some(b"v1".to_vec()));
        assert_eq!(db.storage().document_count(), 1);
        assert_eq!(db.storage().last_doc_id(TEST_COLLECTION), Some(DocId(1)));
        assert_no_leftovers(&db);
        db = h.restart(db);
    }
}

#[test]
fn test_recovery_without_sync_can_run_again() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "keep.xml", &nested_xml(), true);
    store_xml(&db, "keep.xml", &sample_xml(), false);
    CrashHarness::crash(db);

    let dir = h.env().config().resolved_journal_dir();
    for _ in 0..2 {
        let mut store = DocumentStore::open(h.env().path()).unwrap();
        RecoveryManager::new(&dir).recover(&mut store).unwrap();
        assert_eq!(
            store.read_xml(TEST_COLLECTION, &test_path("keep.xml")).unwrap(),
            Some(nested_xml())
        );
    }

    let mut store = DocumentStore::open(h.env().path()).unwrap();
    RecoveryManager::new(&dir).recover(&mut store).unwrap();
    store.sync().unwrap();
    drop(store);

    let db = h.open();
    assert_eq!(xml(&db, "keep.xml"), Some(nested_xml()));
    assert_eq!(db.storage().total_nodes(), nested_xml().node_count());
}

#[test]
fn test_torn_commit_rolls_the_transaction_back() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "first.xml", &sample_xml(), true);
    let torn = store_xml(&db, "second.xml", &nested_xml(), true);
    CrashHarness::crash(db);

    // the commit frame is 21 bytes; cut into it
    h.tear_tail(3);
    let db = h.open();
    let report = db.recovery_report();
    assert!(report.torn_tail.is_some());
    assert_eq!(report.rolled_back, vec![torn]);
    assert_eq!(xml(&db, "first.xml"), Some(sample_xml()));
    assert_eq!(xml(&db, "second.xml"), None);
    assert_eq!(db.storage().total_nodes(), sample_xml().node_count());
}

#[test]
fn test_damaged_final_record_is_a_torn_tail() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "first.xml", &sample_xml(), true);
    CrashHarness::crash(db);

    let len = h.journal_len();
    h.corrupt_byte(len - 1);
    let db = h.open();
    assert!(db.recovery_report().torn_tail.is_some());
    assert_eq!(xml(&db, "first.xml"), None);
}

#[test]
fn test_corruption_before_the_tail_aborts_startup() {
    let h = CrashHarness::new();
    let db = h.open();
    store_xml(&db, "first.xml", &sample_xml(), true);
    CrashHarness::crash(db);

    // type byte of the checkpoint that opens the file
    h.corrupt_byte(strata_core::journal::FILE_HEADER_LEN as u64);
    assert!(h.try_open().is_err());
    // nothing was repaired or deleted; the failure repeats
    assert!(h.try_open().is_err());
    assert_eq!(h.env().journal_files().len(), 1);
}

#[test]
fn test_transaction_ids_continue_after_restart() {
    let h = CrashHarness::new();
    let db = h.open();
    let first = store_xml(&db, "a.xml", &sample_xml(), true);
    let db = h.restart(db);
    let second = store_xml(&db, "b.xml", &sample_xml(), true);
    assert!(second > first);
    let db = h.close_and_reopen(db);
    let third = store_xml(&db, "c.xml", &sample_xml(), true);
    assert!(third > second);
}
