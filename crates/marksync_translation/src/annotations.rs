//! Annotation translation.
//!
//! Local annotations carry their anchoring selector inline; canonically
//! the selector splits off into `personal_annotation_selector`. Deleting
//! an annotation cascades over its selector, privacy level, share link,
//! list entries, tag connections, and any queued Readwise actions.

use crate::error::TranslationResult;
use crate::fields::{changed_fields, copy_fields, i64_field, str_field};
use crate::tags;
use crate::writer::{unresolved, CanonicalWriter};
use marksync_model::{canonical, local};
use marksync_storage::{Object, WherePattern};
use serde_json::{json, Value};

fn id_pattern(id: u64) -> WherePattern {
    let mut where_ = WherePattern::new();
    where_.insert("id".into(), Value::from(id));
    where_
}

fn annotation_pattern(annotation_id: u64) -> WherePattern {
    let mut where_ = WherePattern::new();
    where_.insert("annotation".into(), Value::from(annotation_id));
    where_
}

/// Inserts, replaces, or removes the split-off selector row to match
/// the local object.
fn upsert_selector(
    writer: &CanonicalWriter<'_>,
    annotation_id: u64,
    selector: Option<&Value>,
) -> TranslationResult<()> {
    let existing = writer.find_one(canonical::ANNOTATION_SELECTOR, annotation_pattern(annotation_id))?;
    match (existing, selector) {
        (None, Some(selector)) => {
            let mut row = Object::new();
            row.insert("annotation".into(), Value::from(annotation_id));
            row.insert("selector".into(), selector.clone());
            writer.create(canonical::ANNOTATION_SELECTOR, row)?;
        }
        (Some(current), Some(selector)) => {
            if current.get("selector") != Some(selector) {
                let mut updates = Object::new();
                updates.insert("selector".into(), selector.clone());
                writer.modify(
                    canonical::ANNOTATION_SELECTOR,
                    annotation_pattern(annotation_id),
                    updates,
                )?;
            }
        }
        _ => {}
    }
    Ok(())
}

pub(crate) fn create_annotation(
    writer: &CanonicalWriter<'_>,
    object: &Object,
) -> TranslationResult<()> {
    let url = str_field(object, local::ANNOTATIONS, "url")?;
    let page_url = str_field(object, local::ANNOTATIONS, "page_url")?;
    let metadata_id = writer
        .lookup_metadata(page_url)?
        .ok_or_else(|| unresolved(local::ANNOTATIONS, "page_url", page_url))?;

    match writer.lookup_annotation(url)? {
        None => {
            let mut annotation = Object::new();
            annotation.insert("metadata".into(), Value::from(metadata_id));
            annotation.insert("local_id".into(), Value::from(url));
            copy_fields(&mut annotation, object, &["body", "comment", "created_when"]);
            let annotation_id = writer.create(canonical::ANNOTATION, annotation)?;
            upsert_selector(writer, annotation_id, object.get("selector"))?;
        }
        Some(annotation_id) => {
            let current = writer
                .store()
                .get_by_id(canonical::ANNOTATION, annotation_id)?
                .unwrap_or_default();
            let mut updates = Object::new();
            copy_fields(&mut updates, object, &["body", "comment"]);
            writer.modify(
                canonical::ANNOTATION,
                id_pattern(annotation_id),
                changed_fields(&current, &updates),
            )?;
            upsert_selector(writer, annotation_id, object.get("selector"))?;
        }
    }
    Ok(())
}

pub(crate) fn update_annotation(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let url = str_field(where_, local::ANNOTATIONS, "url")?;
    let Some(annotation_id) = writer.lookup_annotation(url)? else {
        return Ok(());
    };
    let mut canonical_updates = Object::new();
    copy_fields(&mut canonical_updates, updates, &["body", "comment"]);
    writer.modify(
        canonical::ANNOTATION,
        id_pattern(annotation_id),
        canonical_updates,
    )?;
    if let Some(selector) = updates.get("selector") {
        upsert_selector(writer, annotation_id, Some(selector))?;
    }
    Ok(())
}

pub(crate) fn delete_annotations(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let url = str_field(where_, local::ANNOTATIONS, "url")?;
    let Some(annotation_id) = writer.lookup_annotation(url)? else {
        return Ok(());
    };

    writer.delete_with(
        canonical::ANNOTATION_SELECTOR,
        annotation_pattern(annotation_id),
        |_| json!({ "url": url }),
    )?;
    writer.delete_with(
        canonical::ANNOTATION_PRIVACY_LEVEL,
        annotation_pattern(annotation_id),
        |_| json!({ "annotation": url }),
    )?;
    writer.delete_with(
        canonical::ANNOTATION_SHARE,
        annotation_pattern(annotation_id),
        |_| json!({ "local_id": url }),
    )?;
    for entry in writer.find(
        canonical::ANNOTATION_LIST_ENTRY,
        annotation_pattern(annotation_id),
    )? {
        let list_id = entry
            .get("list")
            .and_then(Value::as_u64)
            .map(|id| writer.store().get_by_id(canonical::LIST, id))
            .transpose()?
            .flatten()
            .and_then(|row| row.get("local_id").cloned())
            .unwrap_or(Value::Null);
        let Some(entry_id) = entry.get("id").and_then(Value::as_u64) else {
            continue;
        };
        writer.delete_with(canonical::ANNOTATION_LIST_ENTRY, id_pattern(entry_id), |_| {
            json!({ "list_id": list_id, "annotation_url": url })
        })?;
    }

    let mut tag_where = WherePattern::new();
    tag_where.insert("url".into(), Value::from(url));
    tags::delete_tags(writer, &tag_where)?;

    // Queued Readwise exports for this annotation are server-side only.
    let mut actions = WherePattern::new();
    actions.insert("user".into(), Value::from(writer.user()));
    actions.insert("annotation".into(), Value::from(annotation_id));
    writer
        .store()
        .delete_silent(canonical::READWISE_ACTION, &actions)?;

    writer.delete_with(canonical::ANNOTATION, id_pattern(annotation_id), |_| {
        json!({ "url": url })
    })?;
    Ok(())
}

pub(crate) fn create_privacy_level(
    writer: &CanonicalWriter<'_>,
    object: &Object,
) -> TranslationResult<()> {
    let url = str_field(object, local::ANNOTATION_PRIVACY_LEVELS, "annotation")?;
    let level = i64_field(object, local::ANNOTATION_PRIVACY_LEVELS, "privacy_level")?;
    let annotation_id = writer
        .lookup_annotation(url)?
        .ok_or_else(|| unresolved(local::ANNOTATION_PRIVACY_LEVELS, "annotation", url))?;

    match writer.find_one(
        canonical::ANNOTATION_PRIVACY_LEVEL,
        annotation_pattern(annotation_id),
    )? {
        Some(current) => {
            let mut updates = Object::new();
            updates.insert("level".into(), Value::from(level));
            writer.modify(
                canonical::ANNOTATION_PRIVACY_LEVEL,
                annotation_pattern(annotation_id),
                changed_fields(&current, &updates),
            )?;
        }
        None => {
            let mut row = Object::new();
            row.insert("annotation".into(), Value::from(annotation_id));
            row.insert("level".into(), Value::from(level));
            copy_fields(&mut row, object, &["created_when"]);
            writer.create(canonical::ANNOTATION_PRIVACY_LEVEL, row)?;
        }
    }
    Ok(())
}

pub(crate) fn update_privacy_level(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let url = str_field(where_, local::ANNOTATION_PRIVACY_LEVELS, "annotation")?;
    let Some(annotation_id) = writer.lookup_annotation(url)? else {
        return Ok(());
    };
    let mut canonical_updates = Object::new();
    if let Some(level) = updates.get("privacy_level") {
        canonical_updates.insert("level".into(), level.clone());
    }
    writer.modify(
        canonical::ANNOTATION_PRIVACY_LEVEL,
        annotation_pattern(annotation_id),
        canonical_updates,
    )?;
    Ok(())
}

pub(crate) fn delete_privacy_levels(
    writer: &CanonicalWriter<'_>,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let url = str_field(where_, local::ANNOTATION_PRIVACY_LEVELS, "annotation")?;
    let Some(annotation_id) = writer.lookup_annotation(url)? else {
        return Ok(());
    };
    writer.delete_with(
        canonical::ANNOTATION_PRIVACY_LEVEL,
        annotation_pattern(annotation_id),
        |_| json!({ "annotation": url }),
    )?;
    Ok(())
}
