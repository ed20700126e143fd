//! The static local-to-canonical schema map.
//!
//! Most local collections translate through a declarative
//! [`MappedRule`]: verbatim field copies plus reference edges that swap
//! local natural keys for canonical row ids. The content, locator,
//! visit, tag, annotation, and privacy-level collections carry extra
//! semantics (deduplication, block accounting, garbage collection) and
//! are handled by dedicated translators.

use crate::error::{TranslationError, TranslationResult};
use crate::writer::{unresolved, CanonicalWriter};
use marksync_model::{canonical, local, SchemaVersion, SYNCED_COLLECTIONS};
use marksync_storage::{MemoryStore, Object};
use serde_json::Value;

/// The canonical collections a reference edge can point at, each with a
/// stable local key to translate back on download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    /// `personal_content_metadata`, keyed locally by normalized URL.
    Metadata,
    /// `personal_list`, keyed locally by list id.
    List,
    /// `personal_annotation`, keyed locally by annotation URL.
    Annotation,
}

impl RefTarget {
    /// The canonical collection this target names.
    pub fn collection(self) -> &'static str {
        match self {
            RefTarget::Metadata => canonical::CONTENT_METADATA,
            RefTarget::List => canonical::LIST,
            RefTarget::Annotation => canonical::ANNOTATION,
        }
    }

    /// Resolves a local key value to the canonical row id.
    pub fn resolve(
        self,
        writer: &CanonicalWriter<'_>,
        value: &Value,
    ) -> TranslationResult<Option<u64>> {
        match self {
            RefTarget::Metadata => match value.as_str() {
                Some(url) => writer.lookup_metadata(url),
                None => Ok(None),
            },
            RefTarget::List => match value.as_i64() {
                Some(id) => writer.lookup_list(id),
                None => Ok(None),
            },
            RefTarget::Annotation => match value.as_str() {
                Some(url) => writer.lookup_annotation(url),
                None => Ok(None),
            },
        }
    }

    /// Dereferences a canonical row id back to the local key value.
    pub fn deref(self, store: &MemoryStore, id: u64) -> TranslationResult<Option<Value>> {
        let row = store.get_by_id(self.collection(), id)?;
        let key_field = match self {
            RefTarget::Metadata => "canonical_url",
            RefTarget::List | RefTarget::Annotation => "local_id",
        };
        Ok(row.and_then(|row| row.get(key_field).cloned()))
    }
}

/// One reference edge of a mapped collection.
#[derive(Debug, Clone, Copy)]
pub struct RefEdge {
    /// The local field carrying the natural key.
    pub local_field: &'static str,
    /// The canonical field carrying the row id.
    pub canonical_field: &'static str,
    /// What the edge points at.
    pub target: RefTarget,
}

/// A declaratively translated collection.
#[derive(Debug, Clone, Copy)]
pub struct MappedRule {
    /// Local collection name.
    pub local: &'static str,
    /// Canonical collection name.
    pub canonical: &'static str,
    /// Verbatim field copies, local name to canonical name.
    pub fields: &'static [(&'static str, &'static str)],
    /// Reference edges resolved through canonical row ids.
    pub refs: &'static [RefEdge],
    /// Local fields forming the natural key. Used as the identity for
    /// find-or-create on upload and as the delete info pattern.
    pub key: &'static [&'static str],
    /// First client schema version that understands this collection.
    pub introduced_in: SchemaVersion,
}

const V24: SchemaVersion = SchemaVersion(24);

/// All declaratively mapped collections.
pub static MAPPED_RULES: &[MappedRule] = &[
    MappedRule {
        local: local::BOOKMARKS,
        canonical: canonical::BOOKMARK,
        fields: &[("time", "created_when")],
        refs: &[RefEdge {
            local_field: "url",
            canonical_field: "metadata",
            target: RefTarget::Metadata,
        }],
        key: &["url"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::CUSTOM_LISTS,
        canonical: canonical::LIST,
        fields: &[
            ("id", "local_id"),
            ("name", "name"),
            ("created_at", "created_when"),
            ("is_nestable", "is_nestable"),
        ],
        refs: &[],
        key: &["id"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::LIST_DESCRIPTIONS,
        canonical: canonical::LIST_DESCRIPTION,
        fields: &[("description", "description")],
        refs: &[RefEdge {
            local_field: "list_id",
            canonical_field: "list",
            target: RefTarget::List,
        }],
        key: &["list_id"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::LIST_ENTRIES,
        canonical: canonical::LIST_ENTRY,
        fields: &[("created_at", "created_when")],
        refs: &[
            RefEdge {
                local_field: "list_id",
                canonical_field: "list",
                target: RefTarget::List,
            },
            RefEdge {
                local_field: "page_url",
                canonical_field: "metadata",
                target: RefTarget::Metadata,
            },
        ],
        key: &["list_id", "page_url"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::ANNOTATION_LIST_ENTRIES,
        canonical: canonical::ANNOTATION_LIST_ENTRY,
        fields: &[("created_at", "created_when")],
        refs: &[
            RefEdge {
                local_field: "list_id",
                canonical_field: "list",
                target: RefTarget::List,
            },
            RefEdge {
                local_field: "annotation_url",
                canonical_field: "annotation",
                target: RefTarget::Annotation,
            },
        ],
        key: &["list_id", "annotation_url"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::SHARED_LIST_METADATA,
        canonical: canonical::LIST_SHARE,
        fields: &[("remote_id", "remote_id")],
        refs: &[RefEdge {
            local_field: "local_id",
            canonical_field: "list",
            target: RefTarget::List,
        }],
        key: &["local_id"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::SHARED_ANNOTATION_METADATA,
        canonical: canonical::ANNOTATION_SHARE,
        fields: &[
            ("remote_id", "remote_id"),
            ("exclude_from_lists", "exclude_from_lists"),
        ],
        refs: &[RefEdge {
            local_field: "local_id",
            canonical_field: "annotation",
            target: RefTarget::Annotation,
        }],
        key: &["local_id"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::SETTINGS,
        canonical: canonical::SETTING,
        fields: &[("key", "key"), ("value", "value")],
        refs: &[],
        key: &["key"],
        introduced_in: V24,
    },
    MappedRule {
        local: local::TEMPLATES,
        canonical: canonical::TEXT_TEMPLATE,
        fields: &[
            ("id", "local_id"),
            ("title", "title"),
            ("code", "code"),
            ("is_favourite", "is_favourite"),
        ],
        refs: &[],
        key: &["id"],
        introduced_in: V24,
    },
];

/// How one local collection translates.
#[derive(Debug, Clone, Copy)]
pub enum TranslationRule {
    /// Declarative field/reference mapping.
    Mapped(&'static MappedRule),
    /// Pages: deduplicated content metadata plus a primary locator and
    /// block accounting.
    Content,
    /// Physical content locators.
    Locators,
    /// Visits become content-read events.
    Visits,
    /// Find-or-create tags with orphan collection on disconnect.
    Tags,
    /// Annotations with split-off selector rows.
    Annotations,
    /// Per-annotation privacy levels.
    PrivacyLevels,
}

/// The validated schema map.
pub struct SchemaMap;

impl SchemaMap {
    /// Builds the map, checking that every synced collection has a rule.
    pub fn new() -> TranslationResult<Self> {
        for name in SYNCED_COLLECTIONS {
            if Self::rule_for(name).is_none() {
                return Err(TranslationError::UnsupportedCollection((*name).into()));
            }
        }
        Ok(Self)
    }

    /// Returns the rule for a local collection.
    pub fn rule_for(collection: &str) -> Option<TranslationRule> {
        match collection {
            local::PAGES => Some(TranslationRule::Content),
            local::LOCATORS => Some(TranslationRule::Locators),
            local::VISITS => Some(TranslationRule::Visits),
            local::TAGS => Some(TranslationRule::Tags),
            local::ANNOTATIONS => Some(TranslationRule::Annotations),
            local::ANNOTATION_PRIVACY_LEVELS => Some(TranslationRule::PrivacyLevels),
            _ => MAPPED_RULES
                .iter()
                .find(|rule| rule.local == collection)
                .map(TranslationRule::Mapped),
        }
    }

    /// Returns the mapped rule whose canonical collection matches, for
    /// the download direction.
    pub fn mapped_for_canonical(collection: &str) -> Option<&'static MappedRule> {
        MAPPED_RULES.iter().find(|rule| rule.canonical == collection)
    }
}

impl MappedRule {
    /// Translates a local object to its canonical shape, resolving all
    /// reference edges.
    pub fn to_canonical(
        &self,
        writer: &CanonicalWriter<'_>,
        object: &Object,
    ) -> TranslationResult<Object> {
        let mut out = Object::new();
        for (local_field, canonical_field) in self.fields {
            if let Some(value) = object.get(*local_field) {
                out.insert((*canonical_field).into(), value.clone());
            }
        }
        for edge in self.refs {
            let value = object.get(edge.local_field).ok_or_else(|| {
                TranslationError::MissingField {
                    collection: self.local.into(),
                    field: edge.local_field.into(),
                }
            })?;
            let id = edge
                .target
                .resolve(writer, value)?
                .ok_or_else(|| unresolved(self.local, edge.local_field, value.clone()))?;
            out.insert(edge.canonical_field.into(), Value::from(id));
        }
        Ok(out)
    }

    /// Translates a canonical row back to its local shape.
    pub fn to_local(&self, store: &MemoryStore, row: &Object) -> TranslationResult<Option<Object>> {
        let mut out = Object::new();
        for (local_field, canonical_field) in self.fields {
            if let Some(value) = row.get(*canonical_field) {
                out.insert((*local_field).into(), value.clone());
            }
        }
        for edge in self.refs {
            let id = match row.get(edge.canonical_field).and_then(Value::as_u64) {
                Some(id) => id,
                None => return Ok(None),
            };
            match edge.target.deref(store, id)? {
                Some(value) => out.insert(edge.local_field.into(), value),
                // The referenced row is gone; nothing to materialize.
                None => return Ok(None),
            };
        }
        Ok(Some(out))
    }

    /// The canonical identity pattern for a local object, derived from
    /// the natural-key fields.
    pub fn identity(
        &self,
        writer: &CanonicalWriter<'_>,
        object: &Object,
    ) -> TranslationResult<Object> {
        let mut identity = Object::new();
        for key_field in self.key {
            let value = object.get(*key_field).ok_or_else(|| {
                TranslationError::MissingField {
                    collection: self.local.into(),
                    field: (*key_field).into(),
                }
            })?;
            if let Some(edge) = self.refs.iter().find(|e| e.local_field == *key_field) {
                let id = edge
                    .target
                    .resolve(writer, value)?
                    .ok_or_else(|| unresolved(self.local, key_field, value.clone()))?;
                identity.insert(edge.canonical_field.into(), Value::from(id));
            } else if let Some((_, canonical_field)) =
                self.fields.iter().find(|(lf, _)| lf == key_field)
            {
                identity.insert((*canonical_field).into(), value.clone());
            }
        }
        Ok(identity)
    }

    /// The local natural-key pattern for a canonical row, used as the
    /// delete info.
    pub fn local_key(&self, store: &MemoryStore, row: &Object) -> TranslationResult<Value> {
        let mut key = Object::new();
        for key_field in self.key {
            if let Some(edge) = self.refs.iter().find(|e| e.local_field == *key_field) {
                if let Some(id) = row.get(edge.canonical_field).and_then(Value::as_u64) {
                    if let Some(value) = edge.target.deref(store, id)? {
                        key.insert((*key_field).into(), value);
                    }
                }
            } else if let Some((_, canonical_field)) =
                self.fields.iter().find(|(lf, _)| lf == key_field)
            {
                if let Some(value) = row.get(*canonical_field) {
                    key.insert((*key_field).into(), value.clone());
                }
            }
        }
        Ok(Value::Object(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_synced_collection_has_a_rule() {
        SchemaMap::new().unwrap();
    }

    #[test]
    fn mapped_lookup_both_directions() {
        let rule = match SchemaMap::rule_for(local::BOOKMARKS) {
            Some(TranslationRule::Mapped(rule)) => rule,
            other => panic!("unexpected rule {other:?}"),
        };
        assert_eq!(rule.canonical, canonical::BOOKMARK);
        assert!(SchemaMap::mapped_for_canonical(canonical::BOOKMARK).is_some());
        assert!(SchemaMap::mapped_for_canonical(canonical::CONTENT_METADATA).is_none());
    }
}
