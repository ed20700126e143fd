//! Canned local-shape objects for tests.

use marksync_storage::{object, Object};
use serde_json::json;
use uuid::Uuid;

/// A page row for the given normalized URL.
pub fn page(url: &str) -> Object {
    object([
        ("url", json!(url)),
        ("title", json!(format!("Title of {url}"))),
        ("full_url", json!(format!("https://{url}"))),
    ])
}

/// A PDF locator row pointing at a stored copy of the page.
pub fn pdf_locator(url: &str) -> Object {
    object([
        ("url", json!(url)),
        ("location", json!(format!("blobs/{url}.pdf"))),
        ("location_type", json!("local")),
        ("format", json!("pdf")),
    ])
}

/// An annotation on the page, keyed by the conventional `url/#nonce`.
pub fn annotation(page_url: &str, nonce: u64) -> Object {
    object([
        ("url", json!(format!("{page_url}/#{nonce}"))),
        ("page_url", json!(page_url)),
        ("comment", json!("a note")),
        ("created_when", json!(1_000 + nonce as i64)),
    ])
}

/// A tag connecting `name` to a page or annotation URL.
pub fn tag(name: &str, url: &str) -> Object {
    object([("name", json!(name)), ("url", json!(url))])
}

/// A custom list row.
pub fn custom_list(name: &str) -> Object {
    object([("name", json!(name)), ("created_at", json!(1_000))])
}

/// A membership of a page in a list.
pub fn list_entry(list_id: u64, page_url: &str) -> Object {
    object([
        ("list_id", json!(list_id)),
        ("page_url", json!(page_url)),
        ("created_at", json!(1_000)),
    ])
}

/// A membership of an annotation in a list.
pub fn annotation_list_entry(list_id: u64, annotation_url: &str) -> Object {
    object([
        ("list_id", json!(list_id)),
        ("annotation_url", json!(annotation_url)),
        ("created_at", json!(1_000)),
    ])
}

/// A privacy level row for an annotation.
pub fn privacy_level(annotation_url: &str, level: i64) -> Object {
    object([
        ("annotation", json!(annotation_url)),
        ("privacy_level", json!(level)),
        ("created_when", json!(1_000)),
    ])
}

/// A share handle for an annotation, with a fresh remote id.
pub fn annotation_share(annotation_url: &str) -> Object {
    object([
        ("local_id", json!(annotation_url)),
        ("remote_id", json!(remote_id())),
    ])
}

/// A share handle for a list, with a fresh remote id.
pub fn list_share(list_id: u64) -> Object {
    object([("local_id", json!(list_id)), ("remote_id", json!(remote_id()))])
}

/// A client-generated remote id, the way devices mint them.
pub fn remote_id() -> String {
    Uuid::new_v4().to_string()
}
