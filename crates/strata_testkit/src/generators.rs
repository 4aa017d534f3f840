//! Property-based test generators using proptest.

use crate::store::Fragment;
use proptest::prelude::*;

/// Strategy for element names.
pub fn element_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for text content, including characters XML must escape.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 <>&]{1,24}").expect("Invalid regex")
}

/// Strategy for XML trees up to a few levels deep, always rooted at an
/// element.
pub fn fragment_strategy() -> impl Strategy<Value = Fragment> {
    let leaf = prop_oneof![
        text_strategy().prop_map(Fragment::Text),
        element_name_strategy().prop_map(|name| Fragment::element(name, [])),
    ];
    let tree = leaf.prop_recursive(3, 24, 4, |inner| {
        (element_name_strategy(), prop::collection::vec(inner, 0..4))
            .prop_map(|(name, children)| Fragment::element(name, children))
    });
    (element_name_strategy(), prop::collection::vec(tree, 0..4))
        .prop_map(|(name, children)| Fragment::element(name, children))
}

/// Strategy for binary document content.
pub fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Store an XML document under the given name.
    StoreXml(String, Fragment),
    /// Store a binary document under the given name.
    StoreBinary(String, Vec<u8>),
    /// Remove the document with the given name.
    Remove(String),
}

/// Strategy for operations over a small set of names, so that replaces
/// and removals of existing documents are common.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    let name = prop::sample::select(vec!["a.xml", "b.xml", "c.bin", "d.bin"]).prop_map(String::from);
    prop_oneof![
        3 => (name.clone(), fragment_strategy()).prop_map(|(n, f)| Operation::StoreXml(n, f)),
        2 => (name.clone(), blob_strategy()).prop_map(|(n, b)| Operation::StoreBinary(n, b)),
        1 => name.prop_map(Operation::Remove),
    ]
}
