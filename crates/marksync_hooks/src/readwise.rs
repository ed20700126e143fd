//! Readwise export: action queueing and delivery.
//!
//! Annotation changes enqueue a `personal_readwise_action` row when the
//! user has a Readwise API key configured. Action rows are written
//! silently: they are a server-side queue, never downloaded, and must
//! not wake storage hooks themselves. A worker drains the queue later,
//! denormalizing each annotation into a highlight at send time so the
//! payload reflects current titles and tags rather than those at
//! enqueue time. The action row is deleted only after Readwise confirms
//! the post; a failed delivery leaves it queued for the next run.

use std::sync::Arc;

use crate::context::HookContext;
use crate::error::{HookResult, ReadwiseError};
use marksync_model::{
    canonical, format_highlight_note, format_highlight_time, iso8601_millis, ReadwiseHighlight,
};
use marksync_storage::{
    object, HandlerOutcome, MemoryStore, Mutation, MutationOp, Object, PostCommitHandler,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Canonical setting key holding a user's Readwise API key.
pub const READWISE_API_KEY_SETTING: &str = "readwise.apiKey";

/// Posts highlights to the Readwise API.
///
/// The production implementation sits at the service edge; tests and
/// the loopback backend use [`RecordingReadwiseClient`].
pub trait ReadwiseClient: Send + Sync {
    /// Posts a batch of highlights under the given API key.
    fn post_highlights(
        &self,
        api_key: &str,
        highlights: &[ReadwiseHighlight],
    ) -> Result<(), ReadwiseError>;
}

/// Enqueues Readwise actions for annotation and tag changes.
pub struct ReadwiseHook {
    cx: Arc<HookContext>,
}

impl ReadwiseHook {
    /// Creates the hook over the canonical store.
    pub fn new(cx: Arc<HookContext>) -> Self {
        Self { cx }
    }

    fn dispatch(&self, mutation: &Mutation) -> HookResult<()> {
        match (mutation.collection.as_str(), mutation.op) {
            (canonical::ANNOTATION, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.enqueue_row(row)?;
                }
            }
            (canonical::ANNOTATION, MutationOp::Update) => {
                if let Some(where_) = &mutation.where_ {
                    for row in self.cx.store().find(canonical::ANNOTATION, where_)? {
                        self.enqueue_row(&row)?;
                    }
                }
            }
            (canonical::TAG_CONNECTION, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.enqueue_connection(row)?;
                }
            }
            (canonical::TAG_CONNECTION, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.enqueue_connection(row)?;
                }
            }
            (canonical::ANNOTATION_LIST_ENTRY, MutationOp::Create) => {
                if let Some(row) = &mutation.object {
                    self.enqueue_membership(row)?;
                }
            }
            (canonical::ANNOTATION_LIST_ENTRY, MutationOp::Delete) => {
                for row in &mutation.removed {
                    self.enqueue_membership(row)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn enqueue_row(&self, annotation: &Object) -> HookResult<()> {
        let (Some(user), Some(id)) = (
            annotation.get("user").and_then(Value::as_str),
            annotation.get("id").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        self.enqueue(user, id)
    }

    fn enqueue_connection(&self, connection: &Object) -> HookResult<()> {
        if connection.get("target_collection").and_then(Value::as_str)
            != Some(canonical::ANNOTATION)
        {
            return Ok(());
        }
        let (Some(user), Some(id)) = (
            connection.get("user").and_then(Value::as_str),
            connection.get("target_id").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        self.enqueue(user, id)
    }

    fn enqueue_membership(&self, entry: &Object) -> HookResult<()> {
        let (Some(user), Some(id)) = (
            entry.get("user").and_then(Value::as_str),
            entry.get("annotation").and_then(Value::as_u64),
        ) else {
            return Ok(());
        };
        self.enqueue(user, id)
    }

    /// Queues one action per (user, annotation), deduplicating against
    /// actions already pending.
    fn enqueue(&self, user: &str, annotation_id: u64) -> HookResult<()> {
        let store = self.cx.store();
        if api_key_for(store, user)?.is_none() {
            return Ok(());
        }
        let key = object([("user", json!(user)), ("annotation", json!(annotation_id))]);
        if store.find_one(canonical::READWISE_ACTION, &key)?.is_some() {
            return Ok(());
        }
        store.upsert_silent(
            canonical::READWISE_ACTION,
            object([
                ("user", json!(user)),
                ("annotation", json!(annotation_id)),
                ("created_when", json!(self.cx.now())),
            ]),
        )?;
        Ok(())
    }
}

impl PostCommitHandler for ReadwiseHook {
    fn handle(&self, mutation: &Mutation) -> HandlerOutcome {
        match self.dispatch(mutation) {
            Ok(()) => HandlerOutcome::Done,
            Err(err) => HandlerOutcome::Fatal(err.to_string()),
        }
    }
}

/// Drains a user's pending Readwise actions.
pub struct ReadwiseWorker {
    cx: Arc<HookContext>,
    client: Arc<dyn ReadwiseClient>,
}

impl ReadwiseWorker {
    /// Creates a worker over the canonical store and a client.
    pub fn new(cx: Arc<HookContext>, client: Arc<dyn ReadwiseClient>) -> Self {
        Self { cx, client }
    }

    /// Delivers all pending actions for `user`, in queue order.
    ///
    /// Returns the number of highlights delivered. A delivery failure
    /// stops the run and keeps the failed action and everything behind
    /// it queued. Actions whose annotation no longer exists are dropped
    /// without a post.
    pub fn deliver_pending(&self, user: &str) -> HookResult<usize> {
        let store = self.cx.store();
        let Some(api_key) = api_key_for(store, user)? else {
            return Ok(0);
        };
        let actions = store.find(canonical::READWISE_ACTION, &object([("user", json!(user))]))?;
        let mut delivered = 0;
        for action in actions {
            let Some(action_id) = action.get("id").cloned() else {
                continue;
            };
            let annotation = action
                .get("annotation")
                .and_then(Value::as_u64)
                .and_then(|id| store.get_by_id(canonical::ANNOTATION, id).ok().flatten());
            let Some(annotation) = annotation else {
                store.delete_silent(canonical::READWISE_ACTION, &object([("id", action_id)]))?;
                continue;
            };
            let highlight = self.build_highlight(user, &annotation)?;
            self.client.post_highlights(&api_key, &[highlight])?;
            delivered += 1;
            store.delete_silent(canonical::READWISE_ACTION, &object([("id", action_id)]))?;
        }
        Ok(delivered)
    }

    fn build_highlight(&self, user: &str, annotation: &Object) -> HookResult<ReadwiseHighlight> {
        let store = self.cx.store();
        let metadata = annotation
            .get("metadata")
            .and_then(Value::as_u64)
            .and_then(|id| store.get_by_id(canonical::CONTENT_METADATA, id).ok().flatten())
            .unwrap_or_default();
        let canonical_url = metadata
            .get("canonical_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let title = metadata
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| canonical_url.clone());
        let source_url = metadata
            .get("full_url")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| canonical_url.clone());
        let created_when = annotation
            .get("created_when")
            .and_then(Value::as_i64)
            .unwrap_or_default();

        let tags = self.tag_names(user, annotation)?;
        let comment = annotation.get("comment").and_then(Value::as_str);
        let text = annotation
            .get("body")
            .and_then(Value::as_str)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format_highlight_time(created_when));

        Ok(ReadwiseHighlight {
            title,
            source_url,
            source_type: "article".to_string(),
            highlighted_at: iso8601_millis(created_when),
            text,
            note: format_highlight_note(comment, &tags),
            location_type: "order".to_string(),
            location: None,
        })
    }

    fn tag_names(&self, user: &str, annotation: &Object) -> HookResult<Vec<String>> {
        let store = self.cx.store();
        let Some(annotation_id) = annotation.get("id").and_then(Value::as_u64) else {
            return Ok(Vec::new());
        };
        let connections = store.find(
            canonical::TAG_CONNECTION,
            &object([
                ("user", json!(user)),
                ("target_collection", json!(canonical::ANNOTATION)),
                ("target_id", json!(annotation_id)),
            ]),
        )?;
        let mut names = Vec::new();
        for connection in connections {
            let tag = connection
                .get("tag")
                .and_then(Value::as_u64)
                .and_then(|id| store.get_by_id(canonical::TAG, id).ok().flatten());
            if let Some(name) = tag.and_then(|t| t.get("name").and_then(Value::as_str).map(String::from)) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

fn api_key_for(store: &MemoryStore, user: &str) -> HookResult<Option<String>> {
    Ok(store
        .find_one(
            canonical::SETTING,
            &object([("user", json!(user)), ("key", json!(READWISE_API_KEY_SETTING))]),
        )?
        .and_then(|row| row.get("value").and_then(Value::as_str).map(String::from)))
}

/// A test double capturing every post, optionally failing on demand.
#[derive(Default)]
pub struct RecordingReadwiseClient {
    posts: Mutex<Vec<(String, Vec<ReadwiseHighlight>)>>,
    failure: Mutex<Option<ReadwiseError>>,
}

impl RecordingReadwiseClient {
    /// Creates a client that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following post fail with `error` until cleared.
    pub fn fail_with(&self, error: ReadwiseError) {
        *self.failure.lock() = Some(error);
    }

    /// Clears a previously set failure.
    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// Everything successfully posted so far.
    pub fn posts(&self) -> Vec<(String, Vec<ReadwiseHighlight>)> {
        self.posts.lock().clone()
    }
}

impl ReadwiseClient for RecordingReadwiseClient {
    fn post_highlights(
        &self,
        api_key: &str,
        highlights: &[ReadwiseHighlight],
    ) -> Result<(), ReadwiseError> {
        if let Some(error) = &*self.failure.lock() {
            return Err(match error {
                ReadwiseError::Unauthorized => ReadwiseError::Unauthorized,
                ReadwiseError::Http(reason) => ReadwiseError::Http(reason.clone()),
            });
        }
        self.posts
            .lock()
            .push((api_key.to_string(), highlights.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksync_model::canonical_registry;
    use marksync_storage::MemoryStore;
    use marksync_translation::{CanonicalWriter, RecordingSink};

    struct FixedClock(i64);
    impl marksync_model::Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    fn harness() -> (Arc<MemoryStore>, Arc<RecordingSink>, Arc<HookContext>) {
        let store = Arc::new(MemoryStore::new(canonical_registry().unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let cx = Arc::new(HookContext::new(
            store.clone(),
            sink.clone(),
            Arc::new(FixedClock(9_000)),
        ));
        store.register_handler(Arc::new(ReadwiseHook::new(cx.clone())));
        (store, sink, cx)
    }

    fn set_api_key(store: &MemoryStore, user: &str) {
        store
            .upsert_silent(
                canonical::SETTING,
                object([
                    ("user", json!(user)),
                    ("created_when", json!(0)),
                    ("key", json!(READWISE_API_KEY_SETTING)),
                    ("value", json!("key-123")),
                ]),
            )
            .unwrap();
    }

    fn insert_annotation(writer: &CanonicalWriter<'_>) -> u64 {
        let metadata = writer
            .create(
                canonical::CONTENT_METADATA,
                object([
                    ("canonical_url", json!("a.com")),
                    ("title", json!("A Page")),
                    ("full_url", json!("https://a.com/article")),
                ]),
            )
            .unwrap();
        writer
            .create(
                canonical::ANNOTATION,
                object([
                    ("metadata", json!(metadata)),
                    ("local_id", json!("a.com/#123")),
                    ("body", json!("highlighted text")),
                    ("comment", json!("note")),
                ]),
            )
            .unwrap()
    }

    fn pending(store: &MemoryStore) -> usize {
        store
            .count(canonical::READWISE_ACTION, &Object::new())
            .unwrap()
    }

    #[test]
    fn enqueue_requires_api_key() {
        let (store, sink, _cx) = harness();
        let writer = CanonicalWriter::new(&store, sink.as_ref(), "alice", Some(1), 1_000);
        insert_annotation(&writer);
        assert_eq!(pending(&store), 0);

        set_api_key(&store, "alice");
        writer
            .modify(
                canonical::ANNOTATION,
                object([("local_id", json!("a.com/#123"))]),
                object([("comment", json!("edited"))]),
            )
            .unwrap();
        assert_eq!(pending(&store), 1);
    }

    #[test]
    fn repeated_changes_queue_one_action() {
        let (store, sink, _cx) = harness();
        set_api_key(&store, "alice");
        let writer = CanonicalWriter::new(&store, sink.as_ref(), "alice", Some(1), 1_000);
        let annotation = insert_annotation(&writer);

        let tag = writer
            .create(canonical::TAG, object([("name", json!("rust lang"))]))
            .unwrap();
        writer
            .create(
                canonical::TAG_CONNECTION,
                object([
                    ("tag", json!(tag)),
                    ("target_collection", json!(canonical::ANNOTATION)),
                    ("target_id", json!(annotation)),
                ]),
            )
            .unwrap();

        assert_eq!(pending(&store), 1);
    }

    #[test]
    fn delivery_denormalizes_and_drains() {
        let (store, sink, cx) = harness();
        set_api_key(&store, "alice");
        let writer = CanonicalWriter::new(&store, sink.as_ref(), "alice", Some(1), 1_000);
        let annotation = insert_annotation(&writer);
        let tag = writer
            .create(canonical::TAG, object([("name", json!("rust lang"))]))
            .unwrap();
        writer
            .create(
                canonical::TAG_CONNECTION,
                object([
                    ("tag", json!(tag)),
                    ("target_collection", json!(canonical::ANNOTATION)),
                    ("target_id", json!(annotation)),
                ]),
            )
            .unwrap();

        let client = Arc::new(RecordingReadwiseClient::new());
        let worker = ReadwiseWorker::new(cx, client.clone());
        assert_eq!(worker.deliver_pending("alice").unwrap(), 1);
        assert_eq!(pending(&store), 0);

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "key-123");
        let highlight = &posts[0].1[0];
        assert_eq!(highlight.title, "A Page");
        assert_eq!(highlight.source_url, "https://a.com/article");
        assert_eq!(highlight.text, "highlighted text");
        assert_eq!(highlight.note.as_deref(), Some(".rust-lang\nnote"));
    }

    #[test]
    fn failed_delivery_keeps_the_action() {
        let (store, sink, cx) = harness();
        set_api_key(&store, "alice");
        let writer = CanonicalWriter::new(&store, sink.as_ref(), "alice", Some(1), 1_000);
        insert_annotation(&writer);
        assert_eq!(pending(&store), 1);

        let client = Arc::new(RecordingReadwiseClient::new());
        client.fail_with(ReadwiseError::Http("timeout".into()));
        let worker = ReadwiseWorker::new(cx, client.clone());
        assert!(worker.deliver_pending("alice").is_err());
        assert_eq!(pending(&store), 1);

        client.succeed();
        assert_eq!(worker.deliver_pending("alice").unwrap(), 1);
        assert_eq!(pending(&store), 0);
    }

    #[test]
    fn stale_actions_are_dropped_without_posting() {
        let (store, _sink, cx) = harness();
        set_api_key(&store, "alice");
        store
            .upsert_silent(
                canonical::READWISE_ACTION,
                object([
                    ("user", json!("alice")),
                    ("created_when", json!(0)),
                    ("annotation", json!(999)),
                ]),
            )
            .unwrap();
        assert_eq!(pending(&store), 1);

        let client = Arc::new(RecordingReadwiseClient::new());
        let worker = ReadwiseWorker::new(cx, client.clone());
        assert_eq!(worker.deliver_pending("alice").unwrap(), 0);
        assert_eq!(pending(&store), 0);
        assert!(client.posts().is_empty());
    }
}
