//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for normalized page URLs from a small pool, so generated
/// sequences revisit the same page often enough to exercise
/// deduplication and deletion paths.
pub fn url_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("site-{n}.com"))
}

/// Strategy for tag names, drawn from a small pool for collisions.
pub fn tag_name_strategy() -> impl Strategy<Value = String> {
    (0u8..5).prop_map(|n| format!("tag-{n}"))
}

/// One step of a page lifecycle sequence.
#[derive(Debug, Clone)]
pub enum PageOp {
    /// Create (or re-create) the page.
    Create(String),
    /// Delete the page if it exists.
    Delete(String),
}

/// Strategy for sequences of page creates and deletes.
pub fn page_ops_strategy() -> impl Strategy<Value = Vec<PageOp>> {
    prop::collection::vec(
        prop_oneof![
            url_strategy().prop_map(PageOp::Create),
            url_strategy().prop_map(PageOp::Delete),
        ],
        0..24,
    )
}

/// One step of a tagging sequence against a fixed page.
#[derive(Debug, Clone)]
pub enum TagOp {
    /// Attach the tag to the page.
    Add(String),
    /// Detach the tag from the page.
    Remove(String),
}

/// Strategy for sequences of tag attach/detach operations.
pub fn tag_ops_strategy() -> impl Strategy<Value = Vec<TagOp>> {
    prop::collection::vec(
        prop_oneof![
            tag_name_strategy().prop_map(TagOp::Add),
            tag_name_strategy().prop_map(TagOp::Remove),
        ],
        0..24,
    )
}
