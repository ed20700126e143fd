//! The seam between translation and the change log.

use marksync_model::ChangeLogEntry;
use parking_lot::Mutex;

/// Receives change-log entries as canonical writes happen.
///
/// The server backs this with the real per-user append-only log; unit
/// tests use [`RecordingSink`]. Implementations assign the entry's
/// sequence number at append time and return it.
pub trait ChangeSink: Send + Sync {
    /// Appends an entry, assigning its per-user sequence number.
    fn record(&self, entry: ChangeLogEntry) -> u64;
}

/// A sink that keeps entries in memory, in append order.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<ChangeLogEntry>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.entries.lock().clone()
    }
}

impl ChangeSink for RecordingSink {
    fn record(&self, mut entry: ChangeLogEntry) -> u64 {
        let mut entries = self.entries.lock();
        let seq = entries.len() as u64 + 1;
        entry.seq = seq;
        entries.push(entry);
        seq
    }
}
