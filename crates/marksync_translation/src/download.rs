//! Download translation: change-log entries into client instructions.
//!
//! Each entry is re-read against current canonical state at download
//! time, so a row created and later deleted within the window produces
//! no stale overwrite. Entries originating on the requesting device are
//! excluded before pagination, which makes `skip` stable across calls
//! as long as the watermark does not move.

use crate::error::TranslationResult;
use crate::map::SchemaMap;
use crate::tags;
use marksync_model::{
    canonical, local, ChangeLogEntry, ChangeType, ClientInstruction, DownloadRequest, SchemaVersion,
    UpdateBatch, LOCATORS_SINCE_VERSION,
};
use marksync_storage::{MemoryStore, Object, WherePattern};
use serde_json::Value;

/// Compiles the change-log tail into an ordered instruction batch.
///
/// `entries` is the user's full log; filtering by watermark, device,
/// and pagination window happens here so the accounting stays in one
/// place.
pub fn download_client_updates(
    store: &MemoryStore,
    entries: &[ChangeLogEntry],
    request: &DownloadRequest,
) -> TranslationResult<UpdateBatch> {
    let relevant: Vec<&ChangeLogEntry> = entries
        .iter()
        .filter(|entry| entry.seq > request.since && !entry.originated_on(request.device))
        .collect();

    let window_end = match request.limit {
        Some(limit) => (request.skip + limit).min(relevant.len()),
        None => relevant.len(),
    };
    let window = relevant.get(request.skip..window_end).unwrap_or(&[]);

    let mut updates = Vec::new();
    for entry in window {
        if let Some(instruction) = translate_entry(store, entry, request.client_schema_version)? {
            updates.push(instruction);
        }
    }

    let complete = window_end >= relevant.len();
    let last_seen = if complete {
        entries
            .iter()
            .map(|entry| entry.seq)
            .max()
            .unwrap_or(request.since)
            .max(request.since)
    } else {
        request.since
    };
    Ok(UpdateBatch {
        updates,
        last_seen,
        next_skip: (!complete).then_some(window_end),
    })
}

fn info_where(entry: &ChangeLogEntry) -> Option<WherePattern> {
    let pattern = entry.info.as_ref()?.as_object()?.clone();
    if pattern.is_empty() {
        None
    } else {
        Some(pattern)
    }
}

fn delete_instruction(entry: &ChangeLogEntry, collection: &str) -> Option<ClientInstruction> {
    match info_where(entry) {
        Some(where_) => Some(ClientInstruction::Delete {
            collection: collection.into(),
            where_,
        }),
        None => {
            tracing::warn!(
                collection = %entry.collection,
                seq = entry.seq,
                "delete entry without usable info, dropped"
            );
            None
        }
    }
}

fn overwrite(collection: &str, object: Object) -> Option<ClientInstruction> {
    Some(ClientInstruction::Overwrite {
        collection: collection.into(),
        object,
    })
}

/// Re-reads the canonical row an entry points at; `None` when it has
/// since been deleted.
fn current_row(store: &MemoryStore, entry: &ChangeLogEntry) -> TranslationResult<Option<Object>> {
    let Some(id) = entry.object_id.as_u64() else {
        return Ok(None);
    };
    Ok(store.get_by_id(&entry.collection, id)?)
}

fn copy_present(dst: &mut Object, src: &Object, fields: &[(&str, &str)]) {
    for (from, to) in fields {
        if let Some(value) = src.get(*from) {
            dst.insert((*to).to_string(), value.clone());
        }
    }
}

fn metadata_url(store: &MemoryStore, row: &Object) -> TranslationResult<Option<Value>> {
    let Some(id) = row.get("metadata").and_then(Value::as_u64) else {
        return Ok(None);
    };
    Ok(store
        .get_by_id(canonical::CONTENT_METADATA, id)?
        .and_then(|metadata| metadata.get("canonical_url").cloned()))
}

fn translate_entry(
    store: &MemoryStore,
    entry: &ChangeLogEntry,
    client_version: SchemaVersion,
) -> TranslationResult<Option<ClientInstruction>> {
    let deleted = entry.change_type == ChangeType::Delete;
    match entry.collection.as_str() {
        canonical::CONTENT_METADATA => {
            if deleted {
                return Ok(delete_instruction(entry, local::PAGES));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let mut page = Object::new();
            copy_present(
                &mut page,
                &row,
                &[
                    ("canonical_url", "url"),
                    ("title", "title"),
                    ("full_url", "full_url"),
                ],
            );
            Ok(overwrite(local::PAGES, page))
        }
        canonical::CONTENT_LOCATOR => {
            if client_version < LOCATORS_SINCE_VERSION {
                return Ok(None);
            }
            if deleted {
                return Ok(delete_instruction(entry, local::LOCATORS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            // The primary locator is an internal anchor; the metadata
            // entry already covers the page itself.
            if row.get("is_primary").and_then(Value::as_bool) == Some(true) {
                return Ok(None);
            }
            let Some(url) = metadata_url(store, &row)? else {
                return Ok(None);
            };
            let mut locator = Object::new();
            locator.insert("url".into(), url);
            copy_present(
                &mut locator,
                &row,
                &[
                    ("location", "location"),
                    ("location_type", "location_type"),
                    ("fingerprint", "fingerprint"),
                    ("format", "format"),
                    ("last_visited", "last_visited"),
                ],
            );
            Ok(overwrite(local::LOCATORS, locator))
        }
        canonical::CONTENT_READ => {
            if deleted {
                return Ok(delete_instruction(entry, local::VISITS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let Some(url) = metadata_url(store, &row)? else {
                return Ok(None);
            };
            let mut visit = Object::new();
            visit.insert("url".into(), url);
            copy_present(&mut visit, &row, &[("read_when", "time"), ("duration", "duration")]);
            Ok(overwrite(local::VISITS, visit))
        }
        canonical::TAG => {
            if deleted {
                return Ok(delete_instruction(entry, local::TAGS));
            }
            // A tag row alone has no local counterpart; connections
            // carry the (name, url) pairs.
            Ok(None)
        }
        canonical::TAG_CONNECTION => {
            if deleted {
                return Ok(delete_instruction(entry, local::TAGS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let name = row
                .get("tag")
                .and_then(Value::as_u64)
                .map(|id| store.get_by_id(canonical::TAG, id))
                .transpose()?
                .flatten()
                .and_then(|tag| tag.get("name").cloned());
            let url = tags::target_url(store, &row)?;
            let (Some(name), Some(url)) = (name, url) else {
                return Ok(None);
            };
            let mut tag = Object::new();
            tag.insert("name".into(), name);
            tag.insert("url".into(), url);
            Ok(overwrite(local::TAGS, tag))
        }
        canonical::ANNOTATION => {
            if deleted {
                return Ok(delete_instruction(entry, local::ANNOTATIONS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let Some(page_url) = metadata_url(store, &row)? else {
                return Ok(None);
            };
            let mut annotation = Object::new();
            annotation.insert("page_url".into(), page_url);
            copy_present(
                &mut annotation,
                &row,
                &[
                    ("local_id", "url"),
                    ("body", "body"),
                    ("comment", "comment"),
                    ("created_when", "created_when"),
                ],
            );
            let mut selector_where = WherePattern::new();
            selector_where.insert("user".into(), Value::from(entry.user.as_str()));
            selector_where.insert("annotation".into(), entry.object_id.clone());
            if let Some(selector) =
                store.find_one(canonical::ANNOTATION_SELECTOR, &selector_where)?
            {
                if let Some(value) = selector.get("selector") {
                    annotation.insert("selector".into(), value.clone());
                }
            }
            Ok(overwrite(local::ANNOTATIONS, annotation))
        }
        // The owning annotation's entries carry the selector inline.
        canonical::ANNOTATION_SELECTOR => Ok(None),
        canonical::ANNOTATION_PRIVACY_LEVEL => {
            if deleted {
                return Ok(delete_instruction(entry, local::ANNOTATION_PRIVACY_LEVELS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let url = row
                .get("annotation")
                .and_then(Value::as_u64)
                .map(|id| store.get_by_id(canonical::ANNOTATION, id))
                .transpose()?
                .flatten()
                .and_then(|annotation| annotation.get("local_id").cloned());
            let Some(url) = url else {
                return Ok(None);
            };
            let mut level = Object::new();
            level.insert("annotation".into(), url);
            copy_present(
                &mut level,
                &row,
                &[("level", "privacy_level"), ("created_when", "created_when")],
            );
            Ok(overwrite(local::ANNOTATION_PRIVACY_LEVELS, level))
        }
        canonical::FOLLOWED_LIST => {
            if deleted {
                return Ok(delete_instruction(entry, local::FOLLOWED_LISTS));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            let mut followed = Object::new();
            copy_present(
                &mut followed,
                &row,
                &[
                    ("shared_list", "shared_list"),
                    ("name", "name"),
                    ("creator", "creator"),
                ],
            );
            Ok(overwrite(local::FOLLOWED_LISTS, followed))
        }
        // Server-side accounting and queues never reach clients.
        canonical::BLOCK_STATS | canonical::READWISE_ACTION | canonical::DEVICE_INFO => Ok(None),
        other => {
            let Some(rule) = SchemaMap::mapped_for_canonical(other) else {
                tracing::warn!(collection = %other, seq = entry.seq, "unmapped log entry, dropped");
                return Ok(None);
            };
            if deleted {
                return Ok(delete_instruction(entry, rule.local));
            }
            let Some(row) = current_row(store, entry)? else {
                return Ok(None);
            };
            Ok(rule
                .to_local(store, &row)?
                .and_then(|object| overwrite(rule.local, object)))
        }
    }
}
