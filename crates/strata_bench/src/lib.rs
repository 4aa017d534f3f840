//! Benchmark utilities.

use strata_core::{Loggable, NodeId, PageNum, TxnId};
use strata_testkit::prelude::*;

/// A text node record whose payload is roughly `size` bytes.
pub fn text_record(txn: u64, size: usize) -> Loggable {
    Loggable::StoreTextNode {
        txn_id: TxnId(txn),
        page: PageNum(txn),
        node_id: NodeId::root().child(1),
        value: "x".repeat(size),
    }
}

/// An XML document with `children` text elements.
pub fn wide_xml(children: usize) -> Fragment {
    Fragment::element(
        "catalog",
        (0..children).map(|i| Fragment::element("item", [Fragment::text(format!("item {i}"))])),
    )
}

/// Commits `docs` XML documents and crashes, leaving every transaction
/// after the open checkpoint for recovery to replay.
pub fn crashed_env(docs: usize) -> TestEnv {
    let env = TestEnv::new();
    let db = env.open();
    for i in 0..docs {
        let mut txn = db.begin().expect("Failed to begin");
        db.storage()
            .store_xml(&txn, TEST_COLLECTION, &test_path(&format!("{i}.xml")), &wide_xml(8))
            .expect("Failed to store");
        txn.commit().expect("Failed to commit");
    }
    CrashHarness::crash(db);
    env
}
