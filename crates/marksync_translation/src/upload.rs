//! Upload translation: local mutations into canonical writes.

use crate::annotations;
use crate::content;
use crate::error::{TranslationError, TranslationResult};
use crate::fields::changed_fields;
use crate::map::{MappedRule, SchemaMap, TranslationRule};
use crate::tags;
use crate::writer::{unresolved, CanonicalWriter};
use marksync_storage::{Mutation, MutationOp, Object, WherePattern};
use serde_json::Value;

fn object_of<'m>(mutation: &'m Mutation) -> TranslationResult<&'m Object> {
    mutation
        .object
        .as_ref()
        .ok_or_else(|| TranslationError::MissingField {
            collection: mutation.collection.clone(),
            field: "object".into(),
        })
}

fn where_of<'m>(mutation: &'m Mutation) -> TranslationResult<&'m WherePattern> {
    mutation
        .where_
        .as_ref()
        .ok_or_else(|| TranslationError::MissingField {
            collection: mutation.collection.clone(),
            field: "where".into(),
        })
}

/// Translates one captured local mutation into canonical writes and
/// change-log entries.
///
/// Skippable errors ([`TranslationError::is_skippable`]) leave the
/// canonical store untouched only if the caller rolls back; the server
/// snapshots around each mutation for exactly that reason.
pub fn translate_upload(
    writer: &CanonicalWriter<'_>,
    mutation: &Mutation,
) -> TranslationResult<()> {
    let rule = SchemaMap::rule_for(&mutation.collection)
        .ok_or_else(|| TranslationError::UnsupportedCollection(mutation.collection.clone()))?;

    match (rule, mutation.op) {
        (TranslationRule::Content, MutationOp::Create) => {
            content::create_page(writer, object_of(mutation)?)
        }
        (TranslationRule::Content, MutationOp::Update) => {
            content::update_page(writer, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::Content, MutationOp::Delete) => {
            content::delete_pages(writer, where_of(mutation)?)
        }
        (TranslationRule::Locators, MutationOp::Create) => {
            content::create_locator(writer, object_of(mutation)?)
        }
        (TranslationRule::Locators, MutationOp::Update) => {
            content::update_locator(writer, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::Locators, MutationOp::Delete) => {
            content::delete_locators(writer, where_of(mutation)?)
        }
        (TranslationRule::Visits, MutationOp::Create) => {
            content::create_visit(writer, object_of(mutation)?)
        }
        (TranslationRule::Visits, MutationOp::Update) => {
            content::update_visit(writer, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::Visits, MutationOp::Delete) => {
            content::delete_visits(writer, where_of(mutation)?)
        }
        (TranslationRule::Tags, MutationOp::Create) => {
            tags::create_tag(writer, object_of(mutation)?)
        }
        // Local tag rows are immutable pairs; an update is a no-op.
        (TranslationRule::Tags, MutationOp::Update) => Ok(()),
        (TranslationRule::Tags, MutationOp::Delete) => {
            tags::delete_tags(writer, where_of(mutation)?)
        }
        (TranslationRule::Annotations, MutationOp::Create) => {
            annotations::create_annotation(writer, object_of(mutation)?)
        }
        (TranslationRule::Annotations, MutationOp::Update) => {
            annotations::update_annotation(writer, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::Annotations, MutationOp::Delete) => {
            annotations::delete_annotations(writer, where_of(mutation)?)
        }
        (TranslationRule::PrivacyLevels, MutationOp::Create) => {
            annotations::create_privacy_level(writer, object_of(mutation)?)
        }
        (TranslationRule::PrivacyLevels, MutationOp::Update) => {
            annotations::update_privacy_level(writer, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::PrivacyLevels, MutationOp::Delete) => {
            annotations::delete_privacy_levels(writer, where_of(mutation)?)
        }
        (TranslationRule::Mapped(rule), MutationOp::Create) => {
            mapped_create(writer, rule, object_of(mutation)?)
        }
        (TranslationRule::Mapped(rule), MutationOp::Update) => {
            mapped_update(writer, rule, where_of(mutation)?, object_of(mutation)?)
        }
        (TranslationRule::Mapped(rule), MutationOp::Delete) => {
            mapped_delete(writer, rule, where_of(mutation)?)
        }
    }
}

/// Translates the fields present in a pattern or update set, resolving
/// any reference edges among them.
fn translate_partial(
    writer: &CanonicalWriter<'_>,
    rule: &MappedRule,
    object: &Object,
) -> TranslationResult<Object> {
    let mut out = Object::new();
    for (key, value) in object {
        if let Some(edge) = rule.refs.iter().find(|e| e.local_field == key) {
            let id = edge
                .target
                .resolve(writer, value)?
                .ok_or_else(|| unresolved(rule.local, key, value.clone()))?;
            out.insert(edge.canonical_field.into(), Value::from(id));
        } else if let Some((_, canonical_field)) =
            rule.fields.iter().find(|(local_field, _)| local_field == key)
        {
            out.insert((*canonical_field).into(), value.clone());
        }
    }
    Ok(out)
}

fn mapped_create(
    writer: &CanonicalWriter<'_>,
    rule: &MappedRule,
    object: &Object,
) -> TranslationResult<()> {
    let canonical_object = rule.to_canonical(writer, object)?;
    let identity = rule.identity(writer, object)?;
    match writer.find_one(rule.canonical, identity.clone())? {
        Some(current) => {
            writer.modify(
                rule.canonical,
                identity,
                changed_fields(&current, &canonical_object),
            )?;
        }
        None => {
            writer.create(rule.canonical, canonical_object)?;
        }
    }
    Ok(())
}

fn mapped_update(
    writer: &CanonicalWriter<'_>,
    rule: &MappedRule,
    where_: &WherePattern,
    updates: &Object,
) -> TranslationResult<()> {
    let canonical_where = translate_partial(writer, rule, where_)?;
    let canonical_updates = translate_partial(writer, rule, updates)?;
    writer.modify(rule.canonical, canonical_where, canonical_updates)?;
    Ok(())
}

fn mapped_delete(
    writer: &CanonicalWriter<'_>,
    rule: &MappedRule,
    where_: &WherePattern,
) -> TranslationResult<()> {
    let canonical_where = translate_partial(writer, rule, where_)?;
    if canonical_where.is_empty() {
        return Ok(());
    }
    let rows = writer.find(rule.canonical, canonical_where)?;
    for row in rows {
        let Some(id) = row.get("id").and_then(Value::as_u64) else {
            continue;
        };
        let info = rule.local_key(writer.store(), &row)?;
        let mut key = WherePattern::new();
        key.insert("id".into(), Value::from(id));
        writer.delete_with(rule.canonical, key, |_| info.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use marksync_model::{canonical, canonical_registry, local, ChangeType};
    use marksync_storage::{object, MemoryStore};
    use serde_json::json;

    struct Fixture {
        store: MemoryStore,
        sink: RecordingSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(canonical_registry().unwrap()),
                sink: RecordingSink::new(),
            }
        }

        fn apply(&self, mutation: Mutation) {
            self.try_apply(mutation).unwrap();
        }

        fn try_apply(&self, mutation: Mutation) -> TranslationResult<()> {
            let writer = CanonicalWriter::new(&self.store, &self.sink, "user-1", Some(1), 1000);
            translate_upload(&writer, &mutation)
        }

        fn insert_page(&self, url: &str, title: &str) {
            self.apply(Mutation::create(
                local::PAGES,
                object([("url", json!(url)), ("title", json!(title))]),
            ));
        }

        fn count(&self, collection: &str) -> usize {
            self.store
                .count(collection, &object([("user", json!("user-1"))]))
                .unwrap()
        }

        fn used_blocks(&self) -> i64 {
            self.store
                .find_one(canonical::BLOCK_STATS, &object([("user", json!("user-1"))]))
                .unwrap()
                .map(|row| row.get("used_blocks").and_then(Value::as_i64).unwrap())
                .unwrap_or(0)
        }
    }

    #[test]
    fn page_create_dedupes_and_counts_blocks() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.insert_page("b.com", "B");
        fx.insert_page("a.com", "A revised");

        assert_eq!(fx.count(canonical::CONTENT_METADATA), 2);
        assert_eq!(fx.count(canonical::CONTENT_LOCATOR), 2);
        assert_eq!(fx.used_blocks(), 2);

        let title = fx
            .store
            .find_one(
                canonical::CONTENT_METADATA,
                &object([("canonical_url", json!("a.com"))]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(title.get("title"), Some(&json!("A revised")));

        // Two creates each log metadata + primary locator; the re-create
        // logs one metadata modify.
        let kinds: Vec<ChangeType> = fx.sink.entries().iter().map(|e| e.change_type).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeType::Create,
                ChangeType::Create,
                ChangeType::Create,
                ChangeType::Create,
                ChangeType::Modify,
            ]
        );
    }

    #[test]
    fn page_delete_removes_locators_and_block() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::delete(
            local::PAGES,
            object([("url", json!("a.com"))]),
        ));

        assert_eq!(fx.count(canonical::CONTENT_METADATA), 0);
        assert_eq!(fx.count(canonical::CONTENT_LOCATOR), 0);
        assert_eq!(fx.used_blocks(), 0);

        let entries = fx.sink.entries();
        let deletes: Vec<&str> = entries
            .iter()
            .filter(|e| e.change_type == ChangeType::Delete)
            .map(|e| e.collection.as_str())
            .collect();
        assert_eq!(
            deletes,
            vec![canonical::CONTENT_METADATA, canonical::CONTENT_LOCATOR]
        );
        assert_eq!(
            entries[entries.len() - 2].info,
            Some(json!({ "url": "a.com" }))
        );
    }

    #[test]
    fn page_delete_with_annotation_fails_closed() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::ANNOTATIONS,
            object([
                ("url", json!("a.com/#111")),
                ("page_url", json!("a.com")),
                ("comment", json!("note")),
                ("created_when", json!(111)),
            ]),
        ));

        let result = fx.try_apply(Mutation::delete(
            local::PAGES,
            object([("url", json!("a.com"))]),
        ));
        assert!(matches!(
            result,
            Err(TranslationError::DependentsExist { .. })
        ));
    }

    #[test]
    fn locator_create_requires_known_page() {
        let fx = Fixture::new();
        let result = fx.try_apply(Mutation::create(
            local::LOCATORS,
            object([
                ("url", json!("missing.com")),
                ("location", json!("blob:1")),
                ("location_type", json!("local")),
            ]),
        ));
        assert!(matches!(
            result,
            Err(TranslationError::UnresolvedReference { .. })
        ));
        assert!(result.unwrap_err().is_skippable());
    }

    #[test]
    fn physical_locator_rows_are_not_primary() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::LOCATORS,
            object([
                ("url", json!("a.com")),
                ("location", json!("blob:1")),
                ("location_type", json!("local")),
                ("fingerprint", json!("f-1")),
            ]),
        ));

        let physical = fx
            .store
            .find_one(
                canonical::CONTENT_LOCATOR,
                &object([("location", json!("blob:1"))]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(physical.get("is_primary"), Some(&json!(false)));
        assert_eq!(fx.count(canonical::CONTENT_LOCATOR), 2);
    }

    #[test]
    fn tag_net_effect_and_orphan_collection() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.insert_page("b.com", "B");
        fx.apply(Mutation::create(
            local::TAGS,
            object([("name", json!("rust")), ("url", json!("a.com"))]),
        ));
        fx.apply(Mutation::create(
            local::TAGS,
            object([("name", json!("rust")), ("url", json!("b.com"))]),
        ));
        assert_eq!(fx.count(canonical::TAG), 1);
        assert_eq!(fx.count(canonical::TAG_CONNECTION), 2);

        fx.apply(Mutation::delete(
            local::TAGS,
            object([("name", json!("rust")), ("url", json!("a.com"))]),
        ));
        assert_eq!(fx.count(canonical::TAG), 1);

        fx.apply(Mutation::delete(
            local::TAGS,
            object([("name", json!("rust")), ("url", json!("b.com"))]),
        ));
        assert_eq!(fx.count(canonical::TAG), 0);
        assert_eq!(fx.count(canonical::TAG_CONNECTION), 0);

        let tag_entries: Vec<ChangeType> = fx
            .sink
            .entries()
            .iter()
            .filter(|e| e.collection == canonical::TAG)
            .map(|e| e.change_type)
            .collect();
        assert_eq!(tag_entries, vec![ChangeType::Create, ChangeType::Delete]);
    }

    #[test]
    fn annotation_selector_splits_off() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::ANNOTATIONS,
            object([
                ("url", json!("a.com/#111")),
                ("page_url", json!("a.com")),
                ("body", json!("highlight")),
                ("selector", json!({ "quote": "highlight" })),
                ("created_when", json!(111)),
            ]),
        ));

        assert_eq!(fx.count(canonical::ANNOTATION), 1);
        let selector = fx
            .store
            .find_one(canonical::ANNOTATION_SELECTOR, &Object::new())
            .unwrap()
            .unwrap();
        assert_eq!(selector.get("selector"), Some(&json!({ "quote": "highlight" })));
    }

    #[test]
    fn annotation_delete_cascades() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::ANNOTATIONS,
            object([
                ("url", json!("a.com/#111")),
                ("page_url", json!("a.com")),
                ("comment", json!("note")),
                ("selector", json!({ "quote": "x" })),
                ("created_when", json!(111)),
            ]),
        ));
        fx.apply(Mutation::create(
            local::ANNOTATION_PRIVACY_LEVELS,
            object([
                ("annotation", json!("a.com/#111")),
                ("privacy_level", json!(200)),
                ("created_when", json!(112)),
            ]),
        ));
        fx.apply(Mutation::create(
            local::TAGS,
            object([("name", json!("rust")), ("url", json!("a.com/#111"))]),
        ));
        fx.apply(Mutation::delete(
            local::ANNOTATIONS,
            object([("url", json!("a.com/#111"))]),
        ));

        assert_eq!(fx.count(canonical::ANNOTATION), 0);
        assert_eq!(fx.count(canonical::ANNOTATION_SELECTOR), 0);
        assert_eq!(fx.count(canonical::ANNOTATION_PRIVACY_LEVEL), 0);
        assert_eq!(fx.count(canonical::TAG), 0);
        assert_eq!(fx.count(canonical::TAG_CONNECTION), 0);
    }

    #[test]
    fn reshare_reuses_single_share_row() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::ANNOTATIONS,
            object([
                ("url", json!("a.com/#111")),
                ("page_url", json!("a.com")),
                ("comment", json!("note")),
                ("created_when", json!(111)),
            ]),
        ));
        fx.apply(Mutation::create(
            local::ANNOTATION_PRIVACY_LEVELS,
            object([
                ("annotation", json!("a.com/#111")),
                ("privacy_level", json!(100)),
                ("created_when", json!(112)),
            ]),
        ));
        fx.apply(Mutation::create(
            local::SHARED_ANNOTATION_METADATA,
            object([
                ("local_id", json!("a.com/#111")),
                ("remote_id", json!("ra-1")),
                ("exclude_from_lists", json!(false)),
            ]),
        ));
        for level in [200, 100, 200] {
            fx.apply(Mutation::update(
                local::ANNOTATION_PRIVACY_LEVELS,
                object([("annotation", json!("a.com/#111"))]),
                object([("privacy_level", json!(level))]),
            ));
        }

        assert_eq!(fx.count(canonical::ANNOTATION_SHARE), 1);
        let share_entries: Vec<ChangeType> = fx
            .sink
            .entries()
            .iter()
            .filter(|e| e.collection == canonical::ANNOTATION_SHARE)
            .map(|e| e.change_type)
            .collect();
        assert_eq!(share_entries, vec![ChangeType::Create]);

        let privacy_modifies = fx
            .sink
            .entries()
            .iter()
            .filter(|e| {
                e.collection == canonical::ANNOTATION_PRIVACY_LEVEL
                    && e.change_type == ChangeType::Modify
            })
            .count();
        assert_eq!(privacy_modifies, 3);
    }

    #[test]
    fn mapped_list_roundtrip_identity() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::CUSTOM_LISTS,
            object([
                ("id", json!(55)),
                ("name", json!("reading")),
                ("created_at", json!(500)),
            ]),
        ));
        fx.apply(Mutation::create(
            local::LIST_ENTRIES,
            object([
                ("list_id", json!(55)),
                ("page_url", json!("a.com")),
                ("created_at", json!(501)),
            ]),
        ));

        let entry = fx
            .store
            .find_one(canonical::LIST_ENTRY, &Object::new())
            .unwrap()
            .unwrap();
        let list = fx
            .store
            .find_one(canonical::LIST, &object([("local_id", json!(55))]))
            .unwrap()
            .unwrap();
        assert_eq!(entry.get("list"), list.get("id"));

        fx.apply(Mutation::delete(
            local::LIST_ENTRIES,
            object([("list_id", json!(55)), ("page_url", json!("a.com"))]),
        ));
        let delete = fx
            .sink
            .entries()
            .into_iter()
            .find(|e| {
                e.collection == canonical::LIST_ENTRY && e.change_type == ChangeType::Delete
            })
            .unwrap();
        assert_eq!(
            delete.info,
            Some(json!({ "list_id": 55, "page_url": "a.com" }))
        );
    }

    #[test]
    fn settings_upsert_logs_modify() {
        let fx = Fixture::new();
        fx.apply(Mutation::create(
            local::SETTINGS,
            object([("key", json!("theme")), ("value", json!("dark"))]),
        ));
        fx.apply(Mutation::create(
            local::SETTINGS,
            object([("key", json!("theme")), ("value", json!("light"))]),
        ));

        assert_eq!(fx.count(canonical::SETTING), 1);
        let kinds: Vec<ChangeType> = fx
            .sink
            .entries()
            .iter()
            .filter(|e| e.collection == canonical::SETTING)
            .map(|e| e.change_type)
            .collect();
        assert_eq!(kinds, vec![ChangeType::Create, ChangeType::Modify]);
    }

    #[test]
    fn privacy_level_requires_integer_level() {
        let fx = Fixture::new();
        fx.insert_page("a.com", "A");
        fx.apply(Mutation::create(
            local::ANNOTATIONS,
            object([
                ("url", json!("a.com/#111")),
                ("page_url", json!("a.com")),
                ("created_when", json!(111)),
            ]),
        ));

        let result = fx.try_apply(Mutation::create(
            local::ANNOTATION_PRIVACY_LEVELS,
            object([
                ("annotation", json!("a.com/#111")),
                ("privacy_level", json!("shared")),
            ]),
        ));
        assert!(matches!(
            result,
            Err(TranslationError::MissingField { .. })
        ));
        assert_eq!(fx.count(canonical::ANNOTATION_PRIVACY_LEVEL), 0);
    }

    #[test]
    fn unknown_collection_is_skippable() {
        let fx = Fixture::new();
        let result = fx.try_apply(Mutation::create("widgets", Object::new()));
        assert!(matches!(
            result,
            Err(TranslationError::UnsupportedCollection(_))
        ));
        assert!(result.unwrap_err().is_skippable());
    }
}
