//! The per-user append-only change log.

use std::collections::HashMap;
use std::sync::Arc;

use marksync_model::{ChangeLogEntry, Clock, UserId};
use marksync_translation::ChangeSink;
use parking_lot::Mutex;

#[derive(Default)]
struct UserLog {
    next_seq: u64,
    entries: Vec<ChangeLogEntry>,
}

/// Append-only change storage, one strictly monotone sequence per user.
///
/// Entries become visible to readers only once appended under the lock;
/// there is no observable pending state. Appended entries are immutable
/// except through [`ChangeLog::truncate_to`], which exists solely so an
/// upload that fails midway can be rolled back together with the store.
pub struct ChangeLog {
    clock: Arc<dyn Clock>,
    users: Mutex<HashMap<UserId, UserLog>>,
}

impl ChangeLog {
    /// Creates an empty log stamping entries with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// All of a user's entries with `seq > since`, in append order.
    pub fn entries_since(&self, user: &str, since: u64) -> Vec<ChangeLogEntry> {
        let users = self.users.lock();
        match users.get(user) {
            Some(log) => log
                .entries
                .iter()
                .filter(|entry| entry.seq > since)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// The highest sequence number appended for `user`, 0 when none.
    pub fn latest_seq(&self, user: &str) -> u64 {
        let users = self.users.lock();
        users.get(user).map(|log| log.next_seq).unwrap_or(0)
    }

    /// Drops every entry of `user` with `seq > keep`.
    ///
    /// Rollback support for failed uploads; never used on entries a
    /// device may already have downloaded.
    pub fn truncate_to(&self, user: &str, keep: u64) {
        let mut users = self.users.lock();
        if let Some(log) = users.get_mut(user) {
            log.entries.retain(|entry| entry.seq <= keep);
            log.next_seq = keep;
        }
    }
}

impl ChangeSink for ChangeLog {
    fn record(&self, mut entry: ChangeLogEntry) -> u64 {
        let now = self.clock.now_ms();
        let mut users = self.users.lock();
        let log = users.entry(entry.user.clone()).or_default();
        log.next_seq += 1;
        entry.seq = log.next_seq;
        entry.created_when = now;
        log.entries.push(entry);
        log.next_seq
    }
}
