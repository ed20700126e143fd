//! Change-log entries.

use crate::session::{DeviceId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of canonical change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// A canonical row was created.
    Create,
    /// A canonical row was modified.
    Modify,
    /// A canonical row was deleted.
    Delete,
}

/// One entry of the per-user append-only change log.
///
/// Entries are immutable once appended. `seq` is a per-user logical
/// clock assigned by the log at append time; consumers use it as their
/// download watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Per-user sequence number, strictly increasing.
    pub seq: u64,
    /// The owning user.
    pub user: UserId,
    /// The originating device; `None` for server-triggered changes
    /// (storage hooks), which every device downloads.
    pub device: Option<DeviceId>,
    /// Milliseconds since the Unix epoch at append time.
    pub created_when: i64,
    /// The kind of change.
    pub change_type: ChangeType,
    /// The canonical collection that changed.
    pub collection: String,
    /// The id of the canonical row.
    pub object_id: Value,
    /// For `Delete`: the natural key of the removed local object, used
    /// directly as the local match pattern on download. Optional
    /// otherwise.
    pub info: Option<Value>,
}

impl ChangeLogEntry {
    /// Builds a `Create` entry. `seq` and `created_when` are assigned at
    /// append time.
    pub fn create(
        user: impl Into<UserId>,
        device: Option<DeviceId>,
        collection: impl Into<String>,
        object_id: impl Into<Value>,
    ) -> Self {
        Self {
            seq: 0,
            user: user.into(),
            device,
            created_when: 0,
            change_type: ChangeType::Create,
            collection: collection.into(),
            object_id: object_id.into(),
            info: None,
        }
    }

    /// Builds a `Modify` entry.
    pub fn modify(
        user: impl Into<UserId>,
        device: Option<DeviceId>,
        collection: impl Into<String>,
        object_id: impl Into<Value>,
    ) -> Self {
        Self {
            change_type: ChangeType::Modify,
            ..Self::create(user, device, collection, object_id)
        }
    }

    /// Builds a `Delete` entry. `info` is mandatory: the deleted row no
    /// longer exists to describe itself.
    pub fn delete(
        user: impl Into<UserId>,
        device: Option<DeviceId>,
        collection: impl Into<String>,
        object_id: impl Into<Value>,
        info: Value,
    ) -> Self {
        Self {
            change_type: ChangeType::Delete,
            info: Some(info),
            ..Self::create(user, device, collection, object_id)
        }
    }

    /// Returns true if this entry originated on the given device.
    pub fn originated_on(&self, device: DeviceId) -> bool {
        self.device == Some(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delete_carries_info() {
        let entry = ChangeLogEntry::delete(
            "user-1",
            Some(1),
            "personal_annotation",
            7,
            json!({ "url": "a.com/#123" }),
        );
        assert_eq!(entry.change_type, ChangeType::Delete);
        assert_eq!(entry.info, Some(json!({ "url": "a.com/#123" })));
    }

    #[test]
    fn origin_check() {
        let entry = ChangeLogEntry::create("user-1", Some(3), "personal_tag", 1);
        assert!(entry.originated_on(3));
        assert!(!entry.originated_on(4));

        let hook = ChangeLogEntry::create("user-1", None, "personal_followed_list", 1);
        assert!(!hook.originated_on(3));
    }
}
