//! The `download_client_updates` request/batch contract.

use crate::collections::SchemaVersion;
use crate::session::{DeviceId, UserId};
use marksync_storage::{Object, WherePattern};
use serde::{Deserialize, Serialize};

/// A request for changes a device has not yet applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// The requesting user.
    pub user: UserId,
    /// The requesting device. Entries originating on this device are
    /// excluded: a device never downloads its own writes back.
    pub device: DeviceId,
    /// The last fully-applied change-log sequence number (watermark).
    pub since: u64,
    /// Number of already-consumed entries past `since` to skip, for
    /// resumable pagination within an unchanged watermark.
    pub skip: usize,
    /// Maximum number of log entries to process in this call.
    pub limit: Option<usize>,
    /// The schema version the client build understands.
    pub client_schema_version: SchemaVersion,
}

impl DownloadRequest {
    /// Creates a request for everything after `since`.
    pub fn new(
        user: impl Into<UserId>,
        device: DeviceId,
        since: u64,
        client_schema_version: SchemaVersion,
    ) -> Self {
        Self {
            user: user.into(),
            device,
            since,
            skip: 0,
            limit: None,
            client_schema_version,
        }
    }

    /// Limits the number of processed entries.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resumes pagination at the given skip offset.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

/// One instruction for the downloading device to apply locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientInstruction {
    /// Insert-or-replace the object in the local collection. Applying
    /// it twice leaves the same state as applying it once.
    Overwrite {
        /// Local collection name.
        collection: String,
        /// The full local-shape object.
        object: Object,
    },
    /// Delete local rows matching the pattern. Absence of a match is a
    /// no-op.
    Delete {
        /// Local collection name.
        collection: String,
        /// Local match pattern (from the log entry's `info`).
        where_: WherePattern,
    },
}

impl ClientInstruction {
    /// The local collection this instruction targets.
    pub fn collection(&self) -> &str {
        match self {
            ClientInstruction::Overwrite { collection, .. } => collection,
            ClientInstruction::Delete { collection, .. } => collection,
        }
    }
}

/// An ordered batch of instructions plus pagination state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBatch {
    /// Instructions in change-log order.
    pub updates: Vec<ClientInstruction>,
    /// Watermark candidate: the highest sequence number covered once
    /// this page and all pages before it are applied.
    pub last_seen: u64,
    /// When more entries remain, the skip offset for the next call;
    /// `None` when the batch is complete.
    pub next_skip: Option<usize>,
}

impl UpdateBatch {
    /// Returns true if further calls are needed to drain the log.
    pub fn has_more(&self) -> bool {
        self.next_skip.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CURRENT_SCHEMA_VERSION;
    use marksync_storage::object;
    use serde_json::json;

    #[test]
    fn request_builder() {
        let req = DownloadRequest::new("user-1", 2, 10, CURRENT_SCHEMA_VERSION)
            .with_limit(50)
            .with_skip(5);
        assert_eq!(req.since, 10);
        assert_eq!(req.limit, Some(50));
        assert_eq!(req.skip, 5);
    }

    #[test]
    fn instruction_collection_accessor() {
        let overwrite = ClientInstruction::Overwrite {
            collection: "pages".into(),
            object: object([("url", json!("https://a.com"))]),
        };
        let delete = ClientInstruction::Delete {
            collection: "tags".into(),
            where_: object([("name", json!("rust"))]),
        };
        assert_eq!(overwrite.collection(), "pages");
        assert_eq!(delete.collection(), "tags");
    }
}
