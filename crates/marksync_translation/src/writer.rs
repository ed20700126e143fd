//! Canonical-side write access with change capture.
//!
//! Every loud write goes through [`CanonicalWriter`], which scopes reads
//! and writes to the session user, stamps ownership fields, and pairs
//! each write with exactly one change-log entry. Block-stats accounting
//! is the one deliberate exception: it is server-side bookkeeping that
//! no client downloads, so it is written silently.

use crate::error::{TranslationError, TranslationResult};
use crate::sink::ChangeSink;
use marksync_model::{canonical, ChangeLogEntry, DeviceId};
use marksync_storage::{MemoryStore, Object, WherePattern};
use serde_json::Value;

/// Writes canonical rows on behalf of one session.
pub struct CanonicalWriter<'a> {
    store: &'a MemoryStore,
    sink: &'a dyn ChangeSink,
    user: &'a str,
    device: Option<DeviceId>,
    now: i64,
}

impl<'a> CanonicalWriter<'a> {
    /// Creates a writer for one user. `device` is `None` for
    /// server-triggered writes, which every device downloads.
    pub fn new(
        store: &'a MemoryStore,
        sink: &'a dyn ChangeSink,
        user: &'a str,
        device: Option<DeviceId>,
        now: i64,
    ) -> Self {
        Self {
            store,
            sink,
            user,
            device,
            now,
        }
    }

    /// The session user.
    pub fn user(&self) -> &str {
        self.user
    }

    /// The wall-clock timestamp stamped onto created rows.
    pub fn now(&self) -> i64 {
        self.now
    }

    /// The underlying canonical store.
    pub fn store(&self) -> &MemoryStore {
        self.store
    }

    fn scoped(&self, mut where_: WherePattern) -> WherePattern {
        where_.insert("user".into(), Value::from(self.user));
        where_
    }

    /// Finds rows of a user-scoped canonical collection.
    pub fn find(&self, collection: &str, where_: WherePattern) -> TranslationResult<Vec<Object>> {
        Ok(self.store.find(collection, &self.scoped(where_))?)
    }

    /// Finds the first matching row of a user-scoped canonical collection.
    pub fn find_one(
        &self,
        collection: &str,
        where_: WherePattern,
    ) -> TranslationResult<Option<Object>> {
        Ok(self.store.find_one(collection, &self.scoped(where_))?)
    }

    /// Creates a canonical row and records a `Create` entry.
    ///
    /// Stamps `user`, `created_by_device`, and (when absent)
    /// `created_when`. Returns the generated row id.
    pub fn create(&self, collection: &str, mut object: Object) -> TranslationResult<u64> {
        object.insert("user".into(), Value::from(self.user));
        if let Some(device) = self.device {
            object.insert("created_by_device".into(), Value::from(device));
        }
        object
            .entry("created_when".to_string())
            .or_insert_with(|| Value::from(self.now));

        let id = self.store.create(collection, object)?;
        let object_id = id.map(Value::from).unwrap_or(Value::Null);
        self.sink.record(ChangeLogEntry::create(
            self.user, self.device, collection, object_id,
        ));
        Ok(id.unwrap_or_default())
    }

    /// Updates matching rows and records one `Modify` entry per row.
    ///
    /// Returns the number of rows changed. An empty update set is a
    /// no-op.
    pub fn modify(
        &self,
        collection: &str,
        where_: WherePattern,
        updates: Object,
    ) -> TranslationResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let scoped = self.scoped(where_);
        let ids: Vec<Value> = self
            .store
            .find(collection, &scoped)?
            .iter()
            .filter_map(|row| row.get("id").cloned())
            .collect();
        let count = self.store.update(collection, &scoped, updates)?;
        for id in ids {
            self.sink
                .record(ChangeLogEntry::modify(self.user, self.device, collection, id));
        }
        Ok(count)
    }

    /// Deletes matching rows, recording one `Delete` entry per row with
    /// the info pattern produced by `info`.
    ///
    /// The info pattern is the natural key the downloading device uses
    /// as its local match; it must be derivable from the row alone.
    pub fn delete_with(
        &self,
        collection: &str,
        where_: WherePattern,
        info: impl Fn(&Object) -> Value,
    ) -> TranslationResult<usize> {
        let rows = self.find(collection, where_)?;
        for row in &rows {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            let mut key = WherePattern::new();
            key.insert("id".into(), id.clone());
            self.store.delete(collection, &key)?;
            self.sink.record(ChangeLogEntry::delete(
                self.user,
                self.device,
                collection,
                id,
                info(row),
            ));
        }
        Ok(rows.len())
    }

    /// Resolves a normalized page URL to its content-metadata row id.
    pub fn lookup_metadata(&self, url: &str) -> TranslationResult<Option<u64>> {
        let mut where_ = WherePattern::new();
        where_.insert("canonical_url".into(), Value::from(url));
        Ok(self
            .find_one(canonical::CONTENT_METADATA, where_)?
            .and_then(|row| row.get("id").and_then(Value::as_u64)))
    }

    /// Resolves a local list id to its canonical list row id.
    pub fn lookup_list(&self, local_id: i64) -> TranslationResult<Option<u64>> {
        let mut where_ = WherePattern::new();
        where_.insert("local_id".into(), Value::from(local_id));
        Ok(self
            .find_one(canonical::LIST, where_)?
            .and_then(|row| row.get("id").and_then(Value::as_u64)))
    }

    /// Resolves an annotation URL to its canonical annotation row id.
    pub fn lookup_annotation(&self, url: &str) -> TranslationResult<Option<u64>> {
        let mut where_ = WherePattern::new();
        where_.insert("local_id".into(), Value::from(url));
        Ok(self
            .find_one(canonical::ANNOTATION, where_)?
            .and_then(|row| row.get("id").and_then(Value::as_u64)))
    }

    /// Dereferences a content-metadata id back to its normalized URL.
    pub fn metadata_url(&self, id: u64) -> TranslationResult<Option<String>> {
        Ok(self
            .store
            .get_by_id(canonical::CONTENT_METADATA, id)?
            .and_then(|row| row.get("canonical_url").and_then(Value::as_str).map(String::from)))
    }

    /// Adjusts the user's block-stats counter, clamping at zero.
    ///
    /// Written silently: quota accounting is never downloaded and must
    /// not wake storage hooks.
    pub fn bump_block_stats(&self, delta: i64) -> TranslationResult<()> {
        let existing = self.find_one(canonical::BLOCK_STATS, WherePattern::new())?;
        match existing {
            Some(mut row) => {
                let used = row.get("used_blocks").and_then(Value::as_i64).unwrap_or(0);
                row.insert("used_blocks".into(), Value::from((used + delta).max(0)));
                self.store.upsert_silent(canonical::BLOCK_STATS, row)?;
            }
            None if delta > 0 => {
                let mut row = Object::new();
                row.insert("user".into(), Value::from(self.user));
                row.insert("created_when".into(), Value::from(self.now));
                row.insert("used_blocks".into(), Value::from(delta));
                self.store.upsert_silent(canonical::BLOCK_STATS, row)?;
            }
            None => {}
        }
        Ok(())
    }
}

/// Builds the error for a reference that has no canonical counterpart.
pub fn unresolved(collection: &str, field: &str, value: impl Into<Value>) -> TranslationError {
    TranslationError::UnresolvedReference {
        collection: collection.into(),
        field: field.into(),
        value: value.into(),
    }
}
