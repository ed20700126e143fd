//! Followed-list bookkeeping.
//!
//! A followed list is a per-user pointer at a shared list's remote id.
//! Rows are written through a deviceless writer so every device of the
//! user downloads the change.

use crate::context::HookContext;
use marksync_model::canonical;
use marksync_storage::object;
use marksync_translation::TranslationResult;
use serde_json::{json, Value};

/// Starts following a shared list. Following twice is a no-op.
pub fn follow_list(
    cx: &HookContext,
    user: &str,
    remote_id: &str,
    name: &str,
    creator: Option<&str>,
) -> TranslationResult<()> {
    let writer = cx.writer_for(user);
    if writer
        .find_one(canonical::FOLLOWED_LIST, object([("shared_list", json!(remote_id))]))?
        .is_some()
    {
        return Ok(());
    }
    let mut row = object([("shared_list", json!(remote_id)), ("name", json!(name))]);
    if let Some(creator) = creator {
        row.insert("creator".into(), json!(creator));
    }
    writer.create(canonical::FOLLOWED_LIST, row)?;
    Ok(())
}

/// Stops following a shared list. Not following is a no-op.
pub fn unfollow_list(cx: &HookContext, user: &str, remote_id: &str) -> TranslationResult<()> {
    let writer = cx.writer_for(user);
    writer.delete_with(
        canonical::FOLLOWED_LIST,
        object([("shared_list", json!(remote_id))]),
        followed_info,
    )?;
    Ok(())
}

/// Drops every user's follow of a shared list that no longer exists.
pub(crate) fn remove_followers(cx: &HookContext, remote_id: &str) -> TranslationResult<()> {
    let rows = cx
        .store()
        .find(canonical::FOLLOWED_LIST, &object([("shared_list", json!(remote_id))]))?;
    for row in rows {
        let Some(user) = row.get("user").and_then(Value::as_str) else {
            continue;
        };
        let user = user.to_string();
        unfollow_list(cx, &user, remote_id)?;
    }
    Ok(())
}

fn followed_info(row: &marksync_storage::Object) -> Value {
    json!({ "shared_list": row.get("shared_list").cloned().unwrap_or(Value::Null) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksync_model::{canonical_registry, ChangeType};
    use marksync_storage::MemoryStore;
    use marksync_translation::RecordingSink;
    use std::sync::Arc;

    struct FixedClock(i64);
    impl marksync_model::Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    fn context() -> (HookContext, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let cx = HookContext::new(
            Arc::new(MemoryStore::new(canonical_registry().unwrap())),
            sink.clone(),
            Arc::new(FixedClock(5_000)),
        );
        (cx, sink)
    }

    #[test]
    fn follow_is_idempotent() {
        let (cx, sink) = context();
        follow_list(&cx, "alice", "rl-1", "Rust", Some("bob")).unwrap();
        follow_list(&cx, "alice", "rl-1", "Rust", Some("bob")).unwrap();

        let rows = cx
            .store()
            .find(canonical::FOLLOWED_LIST, &object([("user", json!("alice"))]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("creator"), Some(&json!("bob")));
        assert_eq!(sink.entries().len(), 1);
        assert!(sink.entries()[0].device.is_none());
    }

    #[test]
    fn unfollow_logs_delete_with_remote_id() {
        let (cx, sink) = context();
        follow_list(&cx, "alice", "rl-1", "Rust", None).unwrap();
        unfollow_list(&cx, "alice", "rl-1").unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].change_type, ChangeType::Delete);
        assert_eq!(entries[1].info, Some(json!({ "shared_list": "rl-1" })));
        assert_eq!(
            cx.store()
                .count(canonical::FOLLOWED_LIST, &marksync_storage::Object::new())
                .unwrap(),
            0
        );
    }
}
