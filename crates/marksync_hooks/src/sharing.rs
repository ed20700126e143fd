//! Sharing side effects of canonical writes.
//!
//! Shared lists and shared annotations are server-owned projections of
//! per-user rows. This hook keeps them consistent with the personal
//! side: a shared list exists while its `personal_list_share` row does;
//! a shared annotation exists while its `personal_annotation_share` row
//! exists AND the annotation's privacy level is a shared one. The share
//! row itself survives a trip through `Private`, so re-sharing reuses
//! the same remote id.
//!
//! Writes to the `shared_*` collections go straight to the store: they
//! are not user-scoped and are never downloaded through the change log.
//! Followed-list rows, by contrast, are personal and go through a
//! deviceless writer so every device picks them up.

use std::sync::Arc;

use crate::context::HookContext;
use crate::followed;
use marksync_model::{canonical, shared, PrivacyLevel};
use marksync_storage::{
    object, HandlerOutcome, Mutation, MutationOp, Object, PostCommitHandler,
};
use marksync_translation::TranslationResult;
use serde_json::{json, Value};

/// Projects personal sharing state into the `shared_*` collections.
pub struct SharingHook {
    cx: Arc<HookContext>,
}

impl SharingHook {
    /// Creates the hook over the canonical store.
    pub fn new(cx: Arc<HookContext>) -> Self {
        Self { cx }
    }

    fn dispatch(&self, mutation: &Mutation) -> TranslationResult<()> {
        match (mutation.collection.as_str(), mutation.op) {
            (canonical::LIST_SHARE, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.on_list_shared(row)?;
                }
            }
            (canonical::LIST_SHARE, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.on_list_unshared(row)?;
                }
            }
            (canonical::LIST, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.on_list_deleted(row)?;
                }
            }
            (canonical::LIST_DESCRIPTION, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.on_description_changed(row)?;
                }
            }
            (canonical::LIST_DESCRIPTION, MutationOp::Update) => {
                for row in self.rows_after(mutation)? {
                    self.on_description_changed(&row)?;
                }
            }
            (canonical::ANNOTATION_SHARE, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.reconcile_from(row)?;
                }
            }
            (canonical::ANNOTATION_SHARE, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.on_annotation_unshared(row)?;
                }
            }
            (canonical::ANNOTATION_PRIVACY_LEVEL, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.reconcile_from(row)?;
                }
            }
            (canonical::ANNOTATION_PRIVACY_LEVEL, MutationOp::Update) => {
                for row in self.rows_after(mutation)? {
                    self.reconcile_from(&row)?;
                }
            }
            (canonical::ANNOTATION_PRIVACY_LEVEL, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.reconcile_from(row)?;
                }
            }
            (canonical::ANNOTATION, MutationOp::Update) => {
                for row in self.rows_after(mutation)? {
                    self.on_annotation_edited(&row)?;
                }
            }
            (canonical::ANNOTATION_LIST_ENTRY, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.materialize_entry(row)?;
                }
            }
            (canonical::ANNOTATION_LIST_ENTRY, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.dematerialize_entry(row)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Rows matching an update's pattern, read back after the commit.
    fn rows_after(&self, mutation: &Mutation) -> TranslationResult<Vec<Object>> {
        match &mutation.where_ {
            Some(where_) => Ok(self.cx.store().find(&mutation.collection, where_)?),
            None => Ok(Vec::new()),
        }
    }

    fn shared_list_row(&self, remote_id: &str) -> TranslationResult<Option<Object>> {
        Ok(self
            .cx
            .store()
            .find_one(shared::LIST, &object([("remote_id", json!(remote_id))]))?)
    }

    fn shared_annotation_row(&self, remote_id: &str) -> TranslationResult<Option<Object>> {
        Ok(self
            .cx
            .store()
            .find_one(shared::ANNOTATION, &object([("remote_id", json!(remote_id))]))?)
    }

    fn on_list_shared(&self, share: &Object) -> TranslationResult<()> {
        let (Some(user), Some(remote_id), Some(list_id)) = (
            share.get("user").and_then(Value::as_str),
            share.get("remote_id").and_then(Value::as_str),
            share.get("list").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        let Some(list) = self.cx.store().get_by_id(canonical::LIST, list_id)? else {
            return Ok(());
        };
        let title = list
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if self.shared_list_row(remote_id)?.is_none() {
            let mut row = object([
                ("remote_id", json!(remote_id)),
                ("creator", json!(user)),
                ("title", json!(title)),
                ("created_when", json!(self.cx.now())),
            ]);
            let description = self
                .cx
                .store()
                .find_one(
                    canonical::LIST_DESCRIPTION,
                    &object([("user", json!(user)), ("list", json!(list_id))]),
                )?
                .and_then(|d| d.get("description").cloned());
            if let Some(description) = description {
                row.insert("description".into(), description);
            }
            self.cx.store().create(shared::LIST, row)?;
        }

        // Annotations already in the list become visible with it.
        let entries = self.cx.store().find(
            canonical::ANNOTATION_LIST_ENTRY,
            &object([("user", json!(user)), ("list", json!(list_id))]),
        )?;
        for entry in entries {
            self.materialize_entry(&entry)?;
        }

        followed::follow_list(&self.cx, user, remote_id, &title, Some(user))
    }

    fn on_list_unshared(&self, share: &Object) -> TranslationResult<()> {
        let Some(remote_id) = share.get("remote_id").and_then(Value::as_str) else {
            return Ok(());
        };
        if let Some(shared_list) = self.shared_list_row(remote_id)? {
            if let Some(id) = shared_list.get("id").cloned() {
                self.cx.store().delete(
                    shared::ANNOTATION_LIST_ENTRY,
                    &object([("shared_list", id)]),
                )?;
            }
            self.cx
                .store()
                .delete(shared::LIST, &object([("remote_id", json!(remote_id))]))?;
        }
        followed::remove_followers(&self.cx, remote_id)
    }

    /// Cascade for a deleted list: memberships, description, and share
    /// go with it, each logged so every collaborator device converges.
    /// Annotations referenced by the entries are left alone.
    fn on_list_deleted(&self, list: &Object) -> TranslationResult<()> {
        let (Some(user), Some(list_id), Some(local_id)) = (
            list.get("user").and_then(Value::as_str),
            list.get("id").and_then(Value::as_u64),
            list.get("local_id").cloned(),
        ) else {
            return Ok(());
        };
        let store = self.cx.store();
        let writer = self.cx.writer_for(user);
        let by_list = || object([("list", json!(list_id))]);

        writer.delete_with(canonical::LIST_ENTRY, by_list(), |entry| {
            let page_url = entry
                .get("metadata")
                .and_then(Value::as_u64)
                .and_then(|id| store.get_by_id(canonical::CONTENT_METADATA, id).ok().flatten())
                .and_then(|m| m.get("canonical_url").cloned())
                .unwrap_or(Value::Null);
            json!({ "list_id": local_id.clone(), "page_url": page_url })
        })?;
        writer.delete_with(canonical::ANNOTATION_LIST_ENTRY, by_list(), |entry| {
            let annotation_url = entry
                .get("annotation")
                .and_then(Value::as_u64)
                .and_then(|id| store.get_by_id(canonical::ANNOTATION, id).ok().flatten())
                .and_then(|a| a.get("local_id").cloned())
                .unwrap_or(Value::Null);
            json!({ "list_id": local_id.clone(), "annotation_url": annotation_url })
        })?;
        writer.delete_with(canonical::LIST_DESCRIPTION, by_list(), |_| {
            json!({ "list_id": local_id.clone() })
        })?;
        // Deleting the share row fires the unshare cascade: the
        // shared_list, its shared entries, and every follower go too.
        writer.delete_with(canonical::LIST_SHARE, by_list(), |_| {
            json!({ "local_id": local_id.clone() })
        })?;
        Ok(())
    }

    fn on_description_changed(&self, description: &Object) -> TranslationResult<()> {
        let (Some(user), Some(list_id), Some(text)) = (
            description.get("user").and_then(Value::as_str),
            description.get("list").and_then(Value::as_u64),
            description.get("description").cloned(),
        ) else {
            return Ok(());
        };
        let share = self.cx.store().find_one(
            canonical::LIST_SHARE,
            &object([("user", json!(user)), ("list", json!(list_id))]),
        )?;
        let Some(remote_id) = share
            .as_ref()
            .and_then(|s| s.get("remote_id").and_then(Value::as_str))
        else {
            return Ok(());
        };
        self.cx.store().update(
            shared::LIST,
            &object([("remote_id", json!(remote_id))]),
            object([("description", text)]),
        )?;
        Ok(())
    }

    fn reconcile_from(&self, row: &Object) -> TranslationResult<()> {
        let (Some(user), Some(annotation_id)) = (
            row.get("user").and_then(Value::as_str),
            row.get("annotation").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        self.reconcile_annotation(user, annotation_id)
    }

    /// Creates, updates, or removes the shared copy of one annotation so
    /// it exists exactly when a share row and a shared privacy level
    /// both do.
    fn reconcile_annotation(&self, user: &str, annotation_id: u64) -> TranslationResult<()> {
        let store = self.cx.store();
        let share = store.find_one(
            canonical::ANNOTATION_SHARE,
            &object([("user", json!(user)), ("annotation", json!(annotation_id))]),
        )?;
        let Some(remote_id) = share
            .as_ref()
            .and_then(|s| s.get("remote_id").and_then(Value::as_str))
        else {
            return Ok(());
        };
        let visible = store
            .find_one(
                canonical::ANNOTATION_PRIVACY_LEVEL,
                &object([("user", json!(user)), ("annotation", json!(annotation_id))]),
            )?
            .and_then(|row| row.get("level").and_then(Value::as_i64))
            .and_then(PrivacyLevel::from_code)
            .map(PrivacyLevel::is_shared)
            .unwrap_or(false);

        let existing = self.shared_annotation_row(remote_id)?;
        if !visible {
            if let Some(existing) = existing {
                self.drop_shared_annotation(&existing)?;
            }
            return Ok(());
        }

        let Some(annotation) = store.get_by_id(canonical::ANNOTATION, annotation_id)? else {
            return Ok(());
        };
        let page_url = annotation
            .get("metadata")
            .and_then(Value::as_u64)
            .and_then(|id| store.get_by_id(canonical::CONTENT_METADATA, id).ok().flatten())
            .and_then(|m| m.get("canonical_url").cloned())
            .unwrap_or(Value::Null);

        match existing {
            None => {
                let mut row = object([
                    ("remote_id", json!(remote_id)),
                    ("creator", json!(user)),
                    ("normalized_page_url", page_url),
                    ("created_when", json!(self.cx.now())),
                    ("updated_when", json!(self.cx.now())),
                ]);
                for field in ["body", "comment"] {
                    if let Some(value) = annotation.get(field) {
                        row.insert(field.into(), value.clone());
                    }
                }
                store.create(shared::ANNOTATION, row)?;

                // List memberships made before sharing become visible now.
                let entries = store.find(
                    canonical::ANNOTATION_LIST_ENTRY,
                    &object([("user", json!(user)), ("annotation", json!(annotation_id))]),
                )?;
                for entry in entries {
                    self.materialize_entry(&entry)?;
                }
            }
            Some(_) => {
                let updates = object([
                    ("body", annotation.get("body").cloned().unwrap_or(Value::Null)),
                    (
                        "comment",
                        annotation.get("comment").cloned().unwrap_or(Value::Null),
                    ),
                    ("updated_when", json!(self.cx.now())),
                ]);
                store.update(
                    shared::ANNOTATION,
                    &object([("remote_id", json!(remote_id))]),
                    updates,
                )?;
            }
        }
        Ok(())
    }

    fn on_annotation_unshared(&self, share: &Object) -> TranslationResult<()> {
        let Some(remote_id) = share.get("remote_id").and_then(Value::as_str) else {
            return Ok(());
        };
        if let Some(existing) = self.shared_annotation_row(remote_id)? {
            self.drop_shared_annotation(&existing)?;
        }
        Ok(())
    }

    fn drop_shared_annotation(&self, row: &Object) -> TranslationResult<()> {
        if let Some(id) = row.get("id").cloned() {
            self.cx.store().delete(
                shared::ANNOTATION_LIST_ENTRY,
                &object([("shared_annotation", id.clone())]),
            )?;
            self.cx
                .store()
                .delete(shared::ANNOTATION, &object([("id", id)]))?;
        }
        Ok(())
    }

    fn on_annotation_edited(&self, annotation: &Object) -> TranslationResult<()> {
        let (Some(user), Some(id)) = (
            annotation.get("user").and_then(Value::as_str),
            annotation.get("id").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        let share = self.cx.store().find_one(
            canonical::ANNOTATION_SHARE,
            &object([("user", json!(user)), ("annotation", json!(id))]),
        )?;
        let Some(remote_id) = share
            .as_ref()
            .and_then(|s| s.get("remote_id").and_then(Value::as_str))
        else {
            return Ok(());
        };
        if self.shared_annotation_row(remote_id)?.is_none() {
            return Ok(());
        }
        let updates = object([
            ("body", annotation.get("body").cloned().unwrap_or(Value::Null)),
            (
                "comment",
                annotation.get("comment").cloned().unwrap_or(Value::Null),
            ),
            ("updated_when", json!(self.cx.now())),
        ]);
        self.cx.store().update(
            shared::ANNOTATION,
            &object([("remote_id", json!(remote_id))]),
            updates,
        )?;
        Ok(())
    }

    /// Resolves a personal list entry to its shared counterparts.
    ///
    /// Returns `None` when either side is not shared, when the share is
    /// excluded from lists, or when the shared annotation is currently
    /// hidden by its privacy level.
    fn shared_pair(&self, entry: &Object) -> TranslationResult<Option<(u64, u64)>> {
        let store = self.cx.store();
        let (Some(user), Some(list_id), Some(annotation_id)) = (
            entry.get("user").and_then(Value::as_str),
            entry.get("list").and_then(Value::as_u64),
            entry.get("annotation").and_then(Value::as_u64),
        ) else {
            return Ok(None);
        };
        let list_share = store.find_one(
            canonical::LIST_SHARE,
            &object([("user", json!(user)), ("list", json!(list_id))]),
        )?;
        let Some(list_remote) = list_share
            .as_ref()
            .and_then(|s| s.get("remote_id").and_then(Value::as_str))
        else {
            return Ok(None);
        };
        let annotation_share = store.find_one(
            canonical::ANNOTATION_SHARE,
            &object([("user", json!(user)), ("annotation", json!(annotation_id))]),
        )?;
        let Some(annotation_share) = annotation_share else {
            return Ok(None);
        };
        if annotation_share
            .get("exclude_from_lists")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Ok(None);
        }
        let Some(annotation_remote) = annotation_share.get("remote_id").and_then(Value::as_str)
        else {
            return Ok(None);
        };
        let shared_list = self
            .shared_list_row(list_remote)?
            .and_then(|row| row.get("id").and_then(Value::as_u64));
        let shared_annotation = self
            .shared_annotation_row(annotation_remote)?
            .and_then(|row| row.get("id").and_then(Value::as_u64));
        match (shared_list, shared_annotation) {
            (Some(list), Some(annotation)) => Ok(Some((list, annotation))),
            _ => Ok(None),
        }
    }

    fn materialize_entry(&self, entry: &Object) -> TranslationResult<()> {
        let Some((shared_list, shared_annotation)) = self.shared_pair(entry)? else {
            return Ok(());
        };
        let store = self.cx.store();
        let key = object([
            ("shared_list", json!(shared_list)),
            ("shared_annotation", json!(shared_annotation)),
        ]);
        if store.find_one(shared::ANNOTATION_LIST_ENTRY, &key)?.is_none() {
            let creator = entry.get("user").cloned().unwrap_or(Value::Null);
            store.create(
                shared::ANNOTATION_LIST_ENTRY,
                object([
                    ("creator", creator),
                    ("shared_list", json!(shared_list)),
                    ("shared_annotation", json!(shared_annotation)),
                    ("created_when", json!(self.cx.now())),
                ]),
            )?;
        }
        Ok(())
    }

    fn dematerialize_entry(&self, entry: &Object) -> TranslationResult<()> {
        let Some((shared_list, shared_annotation)) = self.shared_pair(entry)? else {
            return Ok(());
        };
        self.cx.store().delete(
            shared::ANNOTATION_LIST_ENTRY,
            &object([
                ("shared_list", json!(shared_list)),
                ("shared_annotation", json!(shared_annotation)),
            ]),
        )?;
        Ok(())
    }
}

impl PostCommitHandler for SharingHook {
    fn handle(&self, mutation: &Mutation) -> HandlerOutcome {
        match self.dispatch(mutation) {
            Ok(()) => HandlerOutcome::Done,
            Err(err) if err.is_skippable() => {
                tracing::warn!(
                    collection = %mutation.collection,
                    error = %err,
                    "sharing hook skipped a mutation"
                );
                HandlerOutcome::Done
            }
            Err(err) => HandlerOutcome::Fatal(err.to_string()),
        }
    }
}
