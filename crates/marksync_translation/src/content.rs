//! Content translation: pages, locators, and visits.
//!
//! A local page becomes one deduplicated `personal_content_metadata` row
//! plus a primary locator that anchors the at-least-one-locator
//! invariant. Physical locators (PDFs and the like) become additional
//! non-primary locator rows. Visits become `personal_content_read`
//! events. Block accounting counts one block per metadata row.

use crate::error::{TranslationError, TranslationResult};
use crate::fields::{changed_fields, copy_fields, str_field};
use crate::writer::{unresolved, CanonicalWriter};
use marksync_model::{canonical, local};
use marksync_storage::{Object, WherePattern};
use serde_json::{json, Value};

fn id_pattern(id: u64) -> WherePattern {
    let mut where_ = WherePattern::new();
    where_.insert("id".into(), Value::from(id));
    where_
}

/// Canonical collections that must be empty of references before a
/// metadata row may be deleted.
const METADATA_DEPENDENTS: &[(&str, &str)] = &[
    (canonical::ANNOTATION, "metadata"),
    (canonical::BOOKMARK, "metadata"),
    (canonical::LIST_ENTRY, "metadata"),
    (canonical::CONTENT_READ, "metadata"),
];

pub(crate) fn create_page(
    writer: &CanonicalWriter<'_>,
    object: &Object,
) -> TranslationResult<()> {
    let url = str_field(object, local::PAGES, "url")?;
    match writer.lookup_metadata(url)? {
        None => {
            let mut metadata = Object::new();
            metadata.insert("canonical_url".into(), Value::from(url));
            copy_fields(&mut metadata, object, &["title", "full_url"]);
            let metadata_id = writer.create(canonical::CONTENT_METADATA, metadata)?;

            let mut locator = Object::new();
            locator.insert("metadata".into(), Value::from(metadata_id));
            locator.insert("location".into(), Value::from(url));
            locator.insert("location_type".into(), Value::from("remote"));
            locator.insert("is_primary".into(), Value::from(true));
            locator.insert("valid".into(), Value::from(true));
            writer.create(canonical::CONTENT_LOCATOR, locator)?;

            writer.bump_block_stats(1)?;
        }
        Some(metadata_id) => {
            // Re-creating a known page only refreshes its metadata.
            let current = writer
                .store()
                .get_by_id(canonical::CONTENT_METADATA, metadata_id)?
                .unwrap_or_default();
            let mut updates = Object::new();
            copy_fields(&mut updates, object, &["title", "full_url"]);
            writer.modify(
                canonical::CONTENT_METADATA,
                id_pattern(metadata_id),
                changed_fields(&current, &updates),
            )?;
        }
    }
    Ok(())
}

pub(crate) fn update_page(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let url = str_field(where_, local::PAGES, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        // Updating a page that never reached the cloud is dropped.
        return Ok(());
    };
    let mut canonical_updates = Object::new();
    copy_fields(&mut canonical_updates, updates, &["title", "full_url"]);
    writer.modify(
        canonical::CONTENT_METADATA,
        id_pattern(metadata_id),
        canonical_updates,
    )?;
    Ok(())
}

pub(crate) fn delete_pages(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let url = str_field(where_, local::PAGES, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        return Ok(());
    };

    for (dependent, field) in METADATA_DEPENDENTS {
        let mut pattern = WherePattern::new();
        pattern.insert((*field).into(), Value::from(metadata_id));
        if !writer.find(dependent, pattern)?.is_empty() {
            return Err(TranslationError::DependentsExist {
                collection: local::PAGES.into(),
                dependent: (*dependent).into(),
            });
        }
    }
    let mut connections = WherePattern::new();
    connections.insert(
        "target_collection".into(),
        Value::from(canonical::CONTENT_METADATA),
    );
    connections.insert("target_id".into(), Value::from(metadata_id));
    if !writer.find(canonical::TAG_CONNECTION, connections)?.is_empty() {
        return Err(TranslationError::DependentsExist {
            collection: local::PAGES.into(),
            dependent: canonical::TAG_CONNECTION.into(),
        });
    }

    writer.delete_with(
        canonical::CONTENT_METADATA,
        id_pattern(metadata_id),
        |_| json!({ "url": url }),
    )?;

    let mut locators = WherePattern::new();
    locators.insert("metadata".into(), Value::from(metadata_id));
    writer.delete_with(canonical::CONTENT_LOCATOR, locators, |row| {
        json!({ "url": url, "location": row.get("location").cloned().unwrap_or(Value::Null) })
    })?;

    writer.bump_block_stats(-1)
}

pub(crate) fn create_locator(
    writer: &CanonicalWriter<'_>,
    object: &Object,
) -> TranslationResult<()> {
    let url = str_field(object, local::LOCATORS, "url")?;
    let location = str_field(object, local::LOCATORS, "location")?;
    let metadata_id = writer
        .lookup_metadata(url)?
        .ok_or_else(|| unresolved(local::LOCATORS, "url", url))?;

    let mut identity = WherePattern::new();
    identity.insert("metadata".into(), Value::from(metadata_id));
    identity.insert("location".into(), Value::from(location));
    match writer.find_one(canonical::CONTENT_LOCATOR, identity.clone())? {
        Some(current) => {
            let mut updates = Object::new();
            copy_fields(
                &mut updates,
                object,
                &["location_type", "fingerprint", "format", "last_visited"],
            );
            writer.modify(
                canonical::CONTENT_LOCATOR,
                identity,
                changed_fields(&current, &updates),
            )?;
        }
        None => {
            let mut locator = Object::new();
            locator.insert("metadata".into(), Value::from(metadata_id));
            locator.insert("location".into(), Value::from(location));
            locator.insert("is_primary".into(), Value::from(false));
            locator.insert("valid".into(), Value::from(true));
            copy_fields(
                &mut locator,
                object,
                &["location_type", "fingerprint", "format", "last_visited"],
            );
            writer.create(canonical::CONTENT_LOCATOR, locator)?;
        }
    }
    Ok(())
}

pub(crate) fn update_locator(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let url = str_field(where_, local::LOCATORS, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        return Ok(());
    };
    let mut pattern = WherePattern::new();
    pattern.insert("metadata".into(), Value::from(metadata_id));
    if let Some(location) = where_.get("location") {
        pattern.insert("location".into(), location.clone());
    }
    pattern.insert("is_primary".into(), Value::from(false));

    let mut canonical_updates = Object::new();
    copy_fields(
        &mut canonical_updates,
        updates,
        &["location_type", "fingerprint", "format", "last_visited"],
    );
    writer.modify(canonical::CONTENT_LOCATOR, pattern, canonical_updates)?;
    Ok(())
}

pub(crate) fn delete_locators(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let url = str_field(where_, local::LOCATORS, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        return Ok(());
    };
    let mut pattern = WherePattern::new();
    pattern.insert("metadata".into(), Value::from(metadata_id));
    // The primary locator lives and dies with the page itself.
    pattern.insert("is_primary".into(), Value::from(false));
    if let Some(location) = where_.get("location") {
        pattern.insert("location".into(), location.clone());
    }
    writer.delete_with(canonical::CONTENT_LOCATOR, pattern, |row| {
        json!({ "url": url, "location": row.get("location").cloned().unwrap_or(Value::Null) })
    })?;
    Ok(())
}

pub(crate) fn create_visit(
    writer: &CanonicalWriter<'_>,
    object: &Object,
) -> TranslationResult<()> {
    let url = str_field(object, local::VISITS, "url")?;
    let time = object
        .get("time")
        .cloned()
        .ok_or_else(|| TranslationError::MissingField {
            collection: local::VISITS.into(),
            field: "time".into(),
        })?;
    let metadata_id = writer
        .lookup_metadata(url)?
        .ok_or_else(|| unresolved(local::VISITS, "url", url))?;

    let mut identity = WherePattern::new();
    identity.insert("metadata".into(), Value::from(metadata_id));
    identity.insert("read_when".into(), time.clone());
    match writer.find_one(canonical::CONTENT_READ, identity.clone())? {
        Some(current) => {
            let mut updates = Object::new();
            copy_fields(&mut updates, object, &["duration"]);
            writer.modify(
                canonical::CONTENT_READ,
                identity,
                changed_fields(&current, &updates),
            )?;
        }
        None => {
            let mut read = Object::new();
            read.insert("metadata".into(), Value::from(metadata_id));
            read.insert("read_when".into(), time.clone());
            read.insert("created_when".into(), time);
            copy_fields(&mut read, object, &["duration"]);
            writer.create(canonical::CONTENT_READ, read)?;
        }
    }
    Ok(())
}

pub(crate) fn update_visit(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let url = str_field(where_, local::VISITS, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        return Ok(());
    };
    let mut pattern = WherePattern::new();
    pattern.insert("metadata".into(), Value::from(metadata_id));
    if let Some(time) = where_.get("time") {
        pattern.insert("read_when".into(), time.clone());
    }
    let mut canonical_updates = Object::new();
    copy_fields(&mut canonical_updates, updates, &["duration"]);
    writer.modify(canonical::CONTENT_READ, pattern, canonical_updates)?;
    Ok(())
}

pub(crate) fn delete_visits(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let url = str_field(where_, local::VISITS, "url")?;
    let Some(metadata_id) = writer.lookup_metadata(url)? else {
        return Ok(());
    };
    let mut pattern = WherePattern::new();
    pattern.insert("metadata".into(), Value::from(metadata_id));
    if let Some(time) = where_.get("time") {
        pattern.insert("read_when".into(), time.clone());
    }
    writer.delete_with(canonical::CONTENT_READ, pattern, |row| {
        json!({ "url": url, "time": row.get("read_when").cloned().unwrap_or(Value::Null) })
    })?;
    Ok(())
}
