//! The canonical-side entry point.

use std::sync::Arc;

use crate::error::ServerResult;
use crate::log::ChangeLog;
use marksync_hooks::{
    followed, HookContext, ReadwiseClient, ReadwiseHook, ReadwiseWorker, SharingHook,
};
use marksync_model::{
    canonical_registry, Clock, DownloadRequest, Session, UpdateBatch,
};
use marksync_storage::{MemoryStore, Mutation};
use marksync_translation::{
    download_client_updates, translate_upload, CanonicalWriter, SchemaMap,
};

/// How concurrent field-level writes are reconciled.
///
/// Only one policy exists today; it is named so the choice stays
/// visible at the construction site rather than being implicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The latest committed write to a field wins, no merging.
    #[default]
    LastWriteWins,
}

/// What a push did, per logical mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// The user's change-log watermark after the push.
    pub last_seq: u64,
    /// Mutations translated and committed.
    pub applied: usize,
    /// Mutations dropped as untranslatable (stale references, unknown
    /// collections); their effects were rolled back individually.
    pub skipped: usize,
}

/// Owns canonical state for all users: store, change log, and hooks.
///
/// One hub serves every device of every user. A per-hub write lock
/// serializes uploads, so canonical writes, their log entries, and
/// their hook side effects commit in one observable order.
pub struct CloudHub {
    store: Arc<MemoryStore>,
    log: Arc<ChangeLog>,
    clock: Arc<dyn Clock>,
    hooks: Arc<HookContext>,
    policy: ConflictPolicy,
    write_lock: parking_lot::Mutex<()>,
}

impl CloudHub {
    /// Builds a hub with the canonical schema and both standard hooks
    /// registered.
    pub fn new(clock: Arc<dyn Clock>) -> ServerResult<Self> {
        // Fails fast if any synced collection lacks a translation rule.
        SchemaMap::new()?;

        let store = Arc::new(MemoryStore::new(canonical_registry()?));
        let log = Arc::new(ChangeLog::new(clock.clone()));
        let hooks = Arc::new(HookContext::new(store.clone(), log.clone(), clock.clone()));
        store.register_handler(Arc::new(SharingHook::new(hooks.clone())));
        store.register_handler(Arc::new(ReadwiseHook::new(hooks.clone())));

        Ok(Self {
            store,
            log,
            clock,
            hooks,
            policy: ConflictPolicy::LastWriteWins,
            write_lock: parking_lot::Mutex::new(()),
        })
    }

    /// The canonical store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The change log.
    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    /// The active conflict policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Translates and commits a batch of captured local mutations.
    ///
    /// Each logical mutation commits atomically: its canonical writes,
    /// log entries, and hook side effects either all land or are rolled
    /// back. A mutation the translator cannot apply (stale reference,
    /// unsupported collection) is rolled back and skipped; anything
    /// else aborts the batch and restores the pre-batch state.
    pub fn push(&self, session: &Session, mutations: &[Mutation]) -> ServerResult<PushOutcome> {
        let _guard = self.write_lock.lock();
        let batch_snapshot = self.store.snapshot();
        let batch_mark = self.log.latest_seq(&session.user);
        let mut applied = 0;
        let mut skipped = 0;

        for mutation in mutations {
            let snapshot = self.store.snapshot();
            let mark = self.log.latest_seq(&session.user);
            let writer = CanonicalWriter::new(
                &self.store,
                self.log.as_ref(),
                &session.user,
                Some(session.device),
                self.clock.now_ms(),
            );
            match translate_upload(&writer, mutation) {
                Ok(()) => applied += 1,
                Err(err) if err.is_skippable() => {
                    tracing::warn!(
                        user = %session.user,
                        device = session.device,
                        collection = %mutation.collection,
                        error = %err,
                        "skipping untranslatable mutation"
                    );
                    self.store.restore(snapshot);
                    self.log.truncate_to(&session.user, mark);
                    skipped += 1;
                }
                Err(err) => {
                    self.store.restore(batch_snapshot);
                    self.log.truncate_to(&session.user, batch_mark);
                    return Err(err.into());
                }
            }
        }

        Ok(PushOutcome {
            last_seq: self.log.latest_seq(&session.user),
            applied,
            skipped,
        })
    }

    /// Compiles the requesting device's pending change-log tail into
    /// local instructions.
    pub fn download_client_updates(&self, request: &DownloadRequest) -> ServerResult<UpdateBatch> {
        let entries = self.log.entries_since(&request.user, 0);
        Ok(download_client_updates(&self.store, &entries, request)?)
    }

    /// Follows a shared list on behalf of `user`.
    ///
    /// Server-triggered: the resulting rows carry no device id, so
    /// every device of the user downloads them.
    pub fn follow_list(
        &self,
        user: &str,
        remote_id: &str,
        name: &str,
        creator: Option<&str>,
    ) -> ServerResult<()> {
        let _guard = self.write_lock.lock();
        Ok(followed::follow_list(&self.hooks, user, remote_id, name, creator)?)
    }

    /// Unfollows a shared list on behalf of `user`.
    pub fn unfollow_list(&self, user: &str, remote_id: &str) -> ServerResult<()> {
        let _guard = self.write_lock.lock();
        Ok(followed::unfollow_list(&self.hooks, user, remote_id)?)
    }

    /// A delivery worker for the user's queued Readwise actions.
    pub fn readwise_worker(&self, client: Arc<dyn ReadwiseClient>) -> ReadwiseWorker {
        ReadwiseWorker::new(self.hooks.clone(), client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksync_model::{canonical, local, SystemClock, CURRENT_SCHEMA_VERSION};
    use marksync_storage::{object, Object};
    use serde_json::json;

    fn page_mutation(url: &str) -> Mutation {
        Mutation::create(
            local::PAGES,
            object([("url", json!(url)), ("title", json!("t"))]),
        )
    }

    #[test]
    fn push_reports_applied_and_watermark() {
        let hub = CloudHub::new(Arc::new(SystemClock)).unwrap();
        let session = Session::new("alice", 1);

        let outcome = hub.push(&session, &[page_mutation("a.com")]).unwrap();
        // Metadata plus its primary locator.
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.last_seq, 2);
        assert_eq!(
            hub.store()
                .count(canonical::CONTENT_METADATA, &Object::new())
                .unwrap(),
            1
        );
    }

    #[test]
    fn skippable_mutations_leave_no_trace() {
        let hub = CloudHub::new(Arc::new(SystemClock)).unwrap();
        let session = Session::new("alice", 1);

        // The locator references a page that was never uploaded.
        let stale = Mutation::create(
            local::LOCATORS,
            object([("url", json!("missing.com")), ("location", json!("x.pdf"))]),
        );
        let outcome = hub
            .push(&session, &[page_mutation("a.com"), stale])
            .unwrap();

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.last_seq, 2);
        assert_eq!(
            hub.store()
                .count(canonical::CONTENT_LOCATOR, &Object::new())
                .unwrap(),
            1
        );
    }

    #[test]
    fn download_excludes_the_uploading_device() {
        let hub = CloudHub::new(Arc::new(SystemClock)).unwrap();
        hub.push(&Session::new("alice", 1), &[page_mutation("a.com")])
            .unwrap();

        let own = hub
            .download_client_updates(&DownloadRequest::new("alice", 1, 0, CURRENT_SCHEMA_VERSION))
            .unwrap();
        assert!(own.updates.is_empty());
        assert_eq!(own.last_seen, 2);

        let other = hub
            .download_client_updates(&DownloadRequest::new("alice", 2, 0, CURRENT_SCHEMA_VERSION))
            .unwrap();
        assert_eq!(other.updates.len(), 1);
    }

    #[test]
    fn follow_and_unfollow_round_trip() {
        let hub = CloudHub::new(Arc::new(SystemClock)).unwrap();
        hub.follow_list("alice", "rl-1", "Rust", Some("bob")).unwrap();
        assert_eq!(
            hub.store()
                .count(canonical::FOLLOWED_LIST, &Object::new())
                .unwrap(),
            1
        );
        // Deviceless, so even the "requesting" device downloads it.
        let batch = hub
            .download_client_updates(&DownloadRequest::new("alice", 1, 0, CURRENT_SCHEMA_VERSION))
            .unwrap();
        assert_eq!(batch.updates.len(), 1);

        hub.unfollow_list("alice", "rl-1").unwrap();
        assert_eq!(
            hub.store()
                .count(canonical::FOLLOWED_LIST, &Object::new())
                .unwrap(),
            0
        );
    }
}
