//! Tag translation.
//!
//! Local tags are flat `(name, url)` rows; canonically they split into
//! deduplicated `personal_tag` rows and `personal_tag_connection` edges
//! pointing at either content metadata or an annotation. Removing the
//! last connection of a tag collects the orphaned tag row.

use crate::error::TranslationResult;
use crate::fields::str_field;
use crate::writer::{unresolved, CanonicalWriter};
use marksync_model::{canonical, local};
use marksync_storage::{Object, WherePattern};
use serde_json::{json, Value};

/// Annotation URLs are page URLs with a `/#<timestamp>` suffix.
fn is_annotation_url(url: &str) -> bool {
    url.contains("/#")
}

fn id_pattern(id: u64) -> WherePattern {
    let mut where_ = WherePattern::new();
    where_.insert("id".into(), Value::from(id));
    where_
}

/// Resolves a local tag URL to its canonical connection target.
fn resolve_target(
    writer: &CanonicalWriter<'_>,
    url: &str,
) -> TranslationResult<Option<(&'static str, u64)>> {
    if is_annotation_url(url) {
        Ok(writer
            .lookup_annotation(url)?
            .map(|id| (canonical::ANNOTATION, id)))
    } else {
        Ok(writer
            .lookup_metadata(url)?
            .map(|id| (canonical::CONTENT_METADATA, id)))
    }
}

/// Dereferences a connection back to the local tag URL.
pub(crate) fn target_url(
    store: &marksync_storage::MemoryStore,
    connection: &Object,
) -> TranslationResult<Option<Value>> {
    let target_collection = connection
        .get("target_collection")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let Some(target_id) = connection.get("target_id").and_then(Value::as_u64) else {
        return Ok(None);
    };
    let key_field = if target_collection == canonical::ANNOTATION {
        "local_id"
    } else {
        "canonical_url"
    };
    let row = store.get_by_id(target_collection, target_id)?;
    Ok(row.and_then(|row| row.get(key_field).cloned()))
}

pub(crate) fn create_tag(writer: &CanonicalWriter<'_>, object: &Object) -> TranslationResult<()> {
    let name = str_field(object, local::TAGS, "name")?;
    let url = str_field(object, local::TAGS, "url")?;
    let (target_collection, target_id) = resolve_target(writer, url)?
        .ok_or_else(|| unresolved(local::TAGS, "url", url))?;

    let mut by_name = WherePattern::new();
    by_name.insert("name".into(), Value::from(name));
    let tag_id = match writer.find_one(canonical::TAG, by_name)? {
        Some(row) => row.get("id").and_then(Value::as_u64).unwrap_or_default(),
        None => {
            let mut tag = Object::new();
            tag.insert("name".into(), Value::from(name));
            writer.create(canonical::TAG, tag)?
        }
    };

    let mut identity = WherePattern::new();
    identity.insert("tag".into(), Value::from(tag_id));
    identity.insert("target_collection".into(), Value::from(target_collection));
    identity.insert("target_id".into(), Value::from(target_id));
    if writer
        .find_one(canonical::TAG_CONNECTION, identity.clone())?
        .is_none()
    {
        writer.create(canonical::TAG_CONNECTION, identity)?;
    }
    Ok(())
}

pub(crate) fn delete_tags(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let name = where_.get("name").and_then(Value::as_str);
    let url = where_.get("url").and_then(Value::as_str);

    let mut pattern = WherePattern::new();
    if let Some(name) = name {
        let mut by_name = WherePattern::new();
        by_name.insert("name".into(), Value::from(name));
        let Some(tag) = writer.find_one(canonical::TAG, by_name)? else {
            return Ok(());
        };
        pattern.insert(
            "tag".into(),
            tag.get("id").cloned().unwrap_or(Value::Null),
        );
    }
    if let Some(url) = url {
        let Some((target_collection, target_id)) = resolve_target(writer, url)? else {
            return Ok(());
        };
        pattern.insert("target_collection".into(), Value::from(target_collection));
        pattern.insert("target_id".into(), Value::from(target_id));
    }
    if pattern.is_empty() {
        return Ok(());
    }

    for connection in writer.find(canonical::TAG_CONNECTION, pattern)? {
        let Some(tag_id) = connection.get("tag").and_then(Value::as_u64) else {
            continue;
        };
        let tag_name = writer
            .store()
            .get_by_id(canonical::TAG, tag_id)?
            .and_then(|row| row.get("name").cloned())
            .unwrap_or(Value::Null);
        let local_url = target_url(writer.store(), &connection)?.unwrap_or(Value::Null);
        let Some(connection_id) = connection.get("id").and_then(Value::as_u64) else {
            continue;
        };

        writer.delete_with(canonical::TAG_CONNECTION, id_pattern(connection_id), |_| {
            json!({ "name": tag_name, "url": local_url })
        })?;

        // Orphaned tags are collected with the last connection.
        let mut remaining = WherePattern::new();
        remaining.insert("tag".into(), Value::from(tag_id));
        if writer.find(canonical::TAG_CONNECTION, remaining)?.is_empty() {
            writer.delete_with(canonical::TAG, id_pattern(tag_id), |row| {
                json!({ "name": row.get("name").cloned().unwrap_or(Value::Null) })
            })?;
        }
    }
    Ok(())
}
