//! Generated workloads: after any number of crashes the store holds
//! exactly the committed documents.

use proptest::prelude::*;
use std::collections::BTreeMap;
use strata_core::Database;
use strata_testkit::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Doc {
    Xml(Fragment),
    Binary(Vec<u8>),
}

type Model = BTreeMap<String, Doc>;

/// Runs `ops` in one transaction against both the database and a copy of
/// the model. Returns the copy.
fn apply(db: &Database<DocumentStore>, txn: &strata_core::Txn<'_>, ops: &[Operation], model: &Model) -> Model {
    let mut staged = model.clone();
    for op in ops {
        match op {
            Operation::StoreXml(name, fragment) => {
                db.storage()
                    .store_xml(txn, TEST_COLLECTION, &test_path(name), fragment)
                    .unwrap();
                staged.insert(name.clone(), Doc::Xml(fragment.clone()));
            }
            Operation::StoreBinary(name, data) => {
                db.storage()
                    .store_binary(txn, TEST_COLLECTION, &test_path(name), data)
                    .unwrap();
                staged.insert(name.clone(), Doc::Binary(data.clone()));
            }
            Operation::Remove(name) => {
                let removed = db
                    .storage()
                    .remove_document(txn, TEST_COLLECTION, &test_path(name))
                    .unwrap();
                assert_eq!(removed, staged.remove(name).is_some(), "{name}");
            }
        }
    }
    staged
}

fn check(db: &Database<DocumentStore>, model: &Model) -> Result<(), TestCaseError> {
    let store = db.storage();
    for name in ["a.xml", "b.xml", "c.bin", "d.bin"] {
        let path = test_path(name);
        let xml = store.read_xml(TEST_COLLECTION, &path).unwrap();
        let binary = store.read_binary(TEST_COLLECTION, &path).unwrap();
        match model.get(name) {
            Some(Doc::Xml(fragment)) => {
                prop_assert_eq!(xml.as_ref(), Some(fragment), "{}", name);
                prop_assert_eq!(binary, None, "{}", name);
            }
            Some(Doc::Binary(data)) => {
                prop_assert_eq!(binary.as_ref(), Some(data), "{}", name);
                prop_assert_eq!(xml, None, "{}", name);
            }
            None => {
                prop_assert!(store.find(TEST_COLLECTION, &path).is_none(), "{} is present", name);
                prop_assert!(!store.blobs().exists(&path).unwrap(), "{} left a file", name);
            }
        }
    }
    prop_assert_eq!(store.document_count(), model.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_recovery_keeps_exactly_the_committed_documents(
        txns in prop::collection::vec((prop::collection::vec(operation_strategy(), 1..4), any::<bool>()), 1..6),
        tail in prop::option::of(prop::collection::vec(operation_strategy(), 1..4)),
        restarts in 1usize..4,
    ) {
        let h = CrashHarness::new();
        let db = h.open();
        let mut model = Model::new();

        for (ops, commit) in &txns {
            let mut txn = db.begin().unwrap();
            let staged = apply(&db, &txn, ops, &model);
            if *commit {
                txn.commit().unwrap();
                model = staged;
            } else {
                db.abort(&mut txn).unwrap();
            }
        }
        check(&db, &model)?;

        if let Some(ops) = &tail {
            // left open and dropped, so the next restart rolls it back
            let txn = db.begin().unwrap();
            apply(&db, &txn, ops, &model);
        }

        let mut db = db;
        for _ in 0..restarts {
            db = h.restart(db);
            check(&db, &model)?;
            prop_assert!(db.storage().backups().unwrap().is_empty());
        }

        let db = h.close_and_reopen(db);
        prop_assert!(db.recovery_report().clean_shutdown);
        check(&db, &model)?;
    }
}
