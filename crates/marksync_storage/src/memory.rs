//! In-memory store implementation.

use crate::error::{StorageError, StorageResult};
use crate::handlers::{HandlerOutcome, Mutation, PostCommitHandler};
use crate::pattern::{matches_pattern, WherePattern};
use crate::schema::{PrimaryKey, Registry};
use crate::Object;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How many times a `Retry` handler outcome is repeated before it is
/// treated as fatal.
const HANDLER_RETRY_BUDGET: u32 = 3;

#[derive(Debug, Clone, Default)]
struct CollectionData {
    /// Rows in insertion order.
    rows: Vec<Object>,
    /// Next auto-assigned id.
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
struct StoreInner {
    collections: BTreeMap<String, CollectionData>,
}

/// A point-in-time copy of all store contents.
///
/// Used by callers that need all-or-nothing semantics across several
/// writes: take a snapshot, write, and restore on failure.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    inner: StoreInner,
}

/// An in-memory record store with post-commit handlers.
///
/// All rows live behind one lock; writes are serialized and handlers
/// observe mutations in commit order. This mirrors the single-writer
/// discipline the sync engine assumes for canonical state.
pub struct MemoryStore {
    registry: Registry,
    inner: RwLock<StoreInner>,
    handlers: RwLock<Vec<Arc<dyn PostCommitHandler>>>,
}

impl MemoryStore {
    /// Creates a store over the given registry.
    pub fn new(registry: Registry) -> Self {
        let mut inner = StoreInner::default();
        for def in registry.iter() {
            inner.collections.insert(
                def.name.to_string(),
                CollectionData {
                    rows: Vec::new(),
                    next_id: 1,
                },
            );
        }
        Self {
            registry,
            inner: RwLock::new(inner),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the schema registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Appends a post-commit handler to the ordered handler list.
    pub fn register_handler(&self, handler: Arc<dyn PostCommitHandler>) {
        self.handlers.write().push(handler);
    }

    /// Creates a row.
    ///
    /// For auto-id collections the generated id is written into the `id`
    /// field and returned. For natural-key collections an existing row
    /// with the same key is replaced.
    pub fn create(&self, collection: &str, object: Object) -> StorageResult<Option<u64>> {
        let (stored, id) = self.write_row(collection, object)?;
        self.run_handlers(&Mutation::create(collection, stored))?;
        Ok(id)
    }

    /// Updates all rows matching `where_` with the fields in `updates`.
    ///
    /// Returns the number of rows changed.
    pub fn update(
        &self,
        collection: &str,
        where_: &WherePattern,
        updates: Object,
    ) -> StorageResult<usize> {
        self.validate_fields(collection, updates.keys())?;
        let count = {
            let mut inner = self.inner.write();
            let data = collection_mut(&mut inner, collection)?;
            let mut count = 0;
            for row in data.rows.iter_mut().filter(|r| matches_pattern(r, where_)) {
                for (k, v) in &updates {
                    row.insert(k.clone(), v.clone());
                }
                count += 1;
            }
            count
        };
        if count > 0 {
            self.run_handlers(&Mutation::update(collection, where_.clone(), updates))?;
        }
        Ok(count)
    }

    /// Deletes all rows matching `where_`, returning how many went away.
    pub fn delete(&self, collection: &str, where_: &WherePattern) -> StorageResult<usize> {
        let removed = self.find(collection, where_)?;
        let count = self.delete_silent(collection, where_)?;
        if count > 0 {
            self.run_handlers(&Mutation::delete(collection, where_.clone()).with_removed(removed))?;
        }
        Ok(count)
    }

    /// Inserts or replaces a row without notifying handlers.
    ///
    /// This is the application path for downloaded `Overwrite`
    /// instructions: replaying a remote change must not be re-captured
    /// as a local one.
    pub fn upsert_silent(&self, collection: &str, object: Object) -> StorageResult<()> {
        self.write_row(collection, object)?;
        Ok(())
    }

    /// Deletes rows without notifying handlers.
    ///
    /// Application path for downloaded `Delete` instructions; deleting an
    /// absent match is a no-op.
    pub fn delete_silent(&self, collection: &str, where_: &WherePattern) -> StorageResult<usize> {
        self.registry.get(collection)?;
        let mut inner = self.inner.write();
        let data = collection_mut(&mut inner, collection)?;
        let before = data.rows.len();
        data.rows.retain(|row| !matches_pattern(row, where_));
        Ok(before - data.rows.len())
    }

    /// Returns all rows matching `where_`, in insertion order.
    pub fn find(&self, collection: &str, where_: &WherePattern) -> StorageResult<Vec<Object>> {
        self.registry.get(collection)?;
        let inner = self.inner.read();
        let data = collection_ref(&inner, collection)?;
        Ok(data
            .rows
            .iter()
            .filter(|row| matches_pattern(row, where_))
            .cloned()
            .collect())
    }

    /// Returns the first row matching `where_`, if any.
    pub fn find_one(&self, collection: &str, where_: &WherePattern) -> StorageResult<Option<Object>> {
        Ok(self.find(collection, where_)?.into_iter().next())
    }

    /// Returns the row with the given auto id.
    pub fn get_by_id(&self, collection: &str, id: u64) -> StorageResult<Option<Object>> {
        let mut pattern = WherePattern::new();
        pattern.insert("id".into(), Value::from(id));
        self.find_one(collection, &pattern)
    }

    /// Counts rows matching `where_`.
    pub fn count(&self, collection: &str, where_: &WherePattern) -> StorageResult<usize> {
        Ok(self.find(collection, where_)?.len())
    }

    /// Takes a full snapshot of current contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            inner: self.inner.read().clone(),
        }
    }

    /// Restores contents from a snapshot.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        *self.inner.write() = snapshot.inner;
    }

    /// Writes a row, assigning an id when needed. Returns the stored row
    /// and the generated id (auto-id collections only).
    fn write_row(&self, collection: &str, mut object: Object) -> StorageResult<(Object, Option<u64>)> {
        let def = self.registry.get(collection)?;
        self.validate_fields(collection, object.keys())?;
        for field in def.fields.iter().filter(|f| !f.optional) {
            if !object.contains_key(field.name) {
                return Err(StorageError::MissingField {
                    collection: collection.into(),
                    field: field.name.into(),
                });
            }
        }

        let mut inner = self.inner.write();
        let data = collection_mut(&mut inner, collection)?;
        let id = match &def.pk {
            PrimaryKey::AutoId => {
                let id = match object.get("id").and_then(Value::as_u64) {
                    // Respect a caller-supplied id, e.g. when restoring rows.
                    Some(preset) => {
                        data.next_id = data.next_id.max(preset + 1);
                        preset
                    }
                    None => {
                        let id = data.next_id;
                        data.next_id += 1;
                        object.insert("id".into(), Value::from(id));
                        id
                    }
                };
                data.rows.retain(|row| row.get("id").and_then(Value::as_u64) != Some(id));
                Some(id)
            }
            PrimaryKey::Fields(key_fields) => {
                let mut key = WherePattern::new();
                for field in *key_fields {
                    let value = object.get(*field).ok_or_else(|| StorageError::MissingField {
                        collection: collection.into(),
                        field: (*field).into(),
                    })?;
                    key.insert((*field).into(), value.clone());
                }
                data.rows.retain(|row| !matches_pattern(row, &key));
                None
            }
        };
        data.rows.push(object.clone());
        Ok((object, id))
    }

    fn validate_fields<'a>(
        &self,
        collection: &str,
        fields: impl Iterator<Item = &'a String>,
    ) -> StorageResult<()> {
        let def = self.registry.get(collection)?;
        for field in fields {
            if !def.has_field(field) {
                return Err(StorageError::UnknownField {
                    collection: collection.into(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Invokes all handlers in order; a `Retry` outcome is repeated a
    /// bounded number of times before it is escalated.
    fn run_handlers(&self, mutation: &Mutation) -> StorageResult<()> {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            let mut attempts = 0;
            loop {
                match handler.handle(mutation) {
                    HandlerOutcome::Done => break,
                    HandlerOutcome::Retry(reason) => {
                        attempts += 1;
                        if attempts >= HANDLER_RETRY_BUDGET {
                            return Err(StorageError::HandlerFailed(reason));
                        }
                        tracing::warn!(
                            collection = %mutation.collection,
                            attempts,
                            %reason,
                            "post-commit handler retry"
                        );
                    }
                    HandlerOutcome::Fatal(reason) => {
                        return Err(StorageError::HandlerFailed(reason));
                    }
                }
            }
        }
        Ok(())
    }
}

fn collection_ref<'a>(inner: &'a StoreInner, name: &str) -> StorageResult<&'a CollectionData> {
    inner
        .collections
        .get(name)
        .ok_or_else(|| StorageError::UnknownCollection(name.into()))
}

fn collection_mut<'a>(
    inner: &'a mut StoreInner,
    name: &str,
) -> StorageResult<&'a mut CollectionData> {
    inner
        .collections
        .get_mut(name)
        .ok_or_else(|| StorageError::UnknownCollection(name.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, FieldType};
    use crate::{object, HandlerOutcome, MutationOp, Object};
    use parking_lot::Mutex;
    use serde_json::json;

    fn store() -> MemoryStore {
        let registry = Registry::from_defs(vec![
            CollectionDef::new("pages", PrimaryKey::Fields(&["url"]))
                .field("url", FieldType::Text)
                .field_opt("title", FieldType::Text),
            CollectionDef::new("lists", PrimaryKey::AutoId).field("name", FieldType::Text),
        ])
        .unwrap();
        MemoryStore::new(registry)
    }

    #[test]
    fn create_returns_generated_id() {
        let store = store();
        let id1 = store.create("lists", object([("name", json!("reading"))])).unwrap();
        let id2 = store.create("lists", object([("name", json!("later"))])).unwrap();
        assert_eq!(id1, Some(1));
        assert_eq!(id2, Some(2));

        let row = store.get_by_id("lists", 2).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&json!("later")));
    }

    #[test]
    fn natural_key_create_replaces() {
        let store = store();
        store
            .create("pages", object([("url", json!("https://a.com")), ("title", json!("A"))]))
            .unwrap();
        store
            .create("pages", object([("url", json!("https://a.com")), ("title", json!("A2"))]))
            .unwrap();

        let rows = store.find("pages", &WherePattern::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), Some(&json!("A2")));
    }

    #[test]
    fn update_matching_rows() {
        let store = store();
        store.create("pages", object([("url", json!("https://a.com"))])).unwrap();
        store.create("pages", object([("url", json!("https://b.com"))])).unwrap();

        let count = store
            .update(
                "pages",
                &object([("url", json!("https://a.com"))]),
                object([("title", json!("A"))]),
            )
            .unwrap();
        assert_eq!(count, 1);

        let row = store
            .find_one("pages", &object([("url", json!("https://a.com"))]))
            .unwrap()
            .unwrap();
        assert_eq!(row.get("title"), Some(&json!("A")));
    }

    #[test]
    fn delete_absent_match_is_noop() {
        let store = store();
        let count = store
            .delete("pages", &object([("url", json!("https://nope.com"))]))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn unknown_field_rejected() {
        let store = store();
        let result = store.create("pages", object([("zap", json!(1))]));
        assert!(matches!(result, Err(StorageError::UnknownField { .. })));
    }

    #[test]
    fn missing_required_field_rejected() {
        let store = store();
        let result = store.create("lists", Object::new());
        assert!(matches!(result, Err(StorageError::MissingField { .. })));
    }

    #[test]
    fn handlers_observe_commits_in_order() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        store.register_handler(Arc::new(move |m: &Mutation| {
            seen2.lock().push((m.collection.clone(), m.op));
            HandlerOutcome::Done
        }));

        store.create("pages", object([("url", json!("https://a.com"))])).unwrap();
        store
            .delete("pages", &object([("url", json!("https://a.com"))]))
            .unwrap();

        let events = seen.lock().clone();
        assert_eq!(
            events,
            vec![
                ("pages".to_string(), MutationOp::Create),
                ("pages".to_string(), MutationOp::Delete),
            ]
        );
    }

    #[test]
    fn silent_writes_skip_handlers() {
        let store = store();
        let seen = Arc::new(Mutex::new(0usize));
        let seen2 = Arc::clone(&seen);
        store.register_handler(Arc::new(move |_: &Mutation| {
            *seen2.lock() += 1;
            HandlerOutcome::Done
        }));

        store
            .upsert_silent("pages", object([("url", json!("https://a.com"))]))
            .unwrap();
        store
            .delete_silent("pages", &object([("url", json!("https://a.com"))]))
            .unwrap();
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn fatal_handler_surfaces() {
        let store = store();
        store.register_handler(Arc::new(|_: &Mutation| {
            HandlerOutcome::Fatal("broken pipe".into())
        }));
        let result = store.create("pages", object([("url", json!("https://a.com"))]));
        assert!(matches!(result, Err(StorageError::HandlerFailed(_))));
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let store = store();
        store.create("pages", object([("url", json!("https://a.com"))])).unwrap();
        let snap = store.snapshot();

        store.create("pages", object([("url", json!("https://b.com"))])).unwrap();
        assert_eq!(store.count("pages", &WherePattern::new()).unwrap(), 2);

        store.restore(snap);
        assert_eq!(store.count("pages", &WherePattern::new()).unwrap(), 1);
    }
}
