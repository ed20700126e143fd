//! The queue between local writes and the push loop.

use std::collections::VecDeque;

use marksync_model::SYNCED_COLLECTIONS;
use marksync_storage::{HandlerOutcome, Mutation, PostCommitHandler};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct OutboxState {
    queue: VecDeque<Mutation>,
    in_flight: bool,
    halted: Option<String>,
}

/// Queued local mutations awaiting upload.
///
/// `enqueue` never blocks; the push loop drains batches and either
/// completes or requeues them. A batch whose retries are exhausted
/// halts the outbox: the mutations stay queued and waiters are
/// released so the failure surfaces instead of hanging.
pub struct Outbox {
    state: Mutex<OutboxState>,
    drained: Condvar,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                in_flight: false,
                halted: None,
            }),
            drained: Condvar::new(),
        }
    }

    /// Queues a mutation. Returns immediately.
    pub fn enqueue(&self, mutation: Mutation) {
        let mut state = self.state.lock();
        state.queue.push_back(mutation);
    }

    /// Number of queued mutations, excluding an in-flight batch.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether nothing is queued or in flight.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && !state.in_flight
    }

    /// Takes up to `max` mutations for an upload attempt.
    pub fn take_batch(&self, max: usize) -> Vec<Mutation> {
        let mut state = self.state.lock();
        let count = state.queue.len().min(max);
        let batch: Vec<Mutation> = state.queue.drain(..count).collect();
        if !batch.is_empty() {
            state.in_flight = true;
        }
        batch
    }

    /// Marks the in-flight batch as delivered.
    pub fn complete_batch(&self) {
        let mut state = self.state.lock();
        state.in_flight = false;
        if state.queue.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Puts a failed batch back at the front, preserving order.
    pub fn requeue_front(&self, batch: Vec<Mutation>) {
        let mut state = self.state.lock();
        for mutation in batch.into_iter().rev() {
            state.queue.push_front(mutation);
        }
        state.in_flight = false;
    }

    /// Records a terminal failure and releases waiters.
    pub fn halt(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.halted = Some(reason.into());
        self.drained.notify_all();
    }

    /// The terminal failure, if the outbox is halted.
    pub fn halt_reason(&self) -> Option<String> {
        self.state.lock().halted.clone()
    }

    /// Blocks until everything queued has been delivered, or a terminal
    /// failure was recorded. Returns `Ok(())` when drained.
    pub fn wait_for_sync(&self) -> Result<(), String> {
        let mut state = self.state.lock();
        loop {
            if let Some(reason) = &state.halted {
                return Err(reason.clone());
            }
            if state.queue.is_empty() && !state.in_flight {
                return Ok(());
            }
            self.drained.wait(&mut state);
        }
    }
}

/// Captures committed local mutations of synced collections.
///
/// Registered as a post-commit handler on the device store. Silent
/// writes (applied downloads) bypass handlers entirely, so nothing a
/// device pulls is ever echoed back up.
pub struct ChangeCapture {
    outbox: Arc<Outbox>,
}

impl ChangeCapture {
    /// Captures into `outbox`.
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

impl PostCommitHandler for ChangeCapture {
    fn handle(&self, mutation: &Mutation) -> HandlerOutcome {
        if SYNCED_COLLECTIONS.contains(&mutation.collection.as_str()) {
            self.outbox.enqueue(mutation.clone());
        }
        HandlerOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksync_model::{local, local_registry};
    use marksync_storage::{object, MemoryStore};
    use serde_json::json;

    #[test]
    fn batches_preserve_order_across_requeue() {
        let outbox = Outbox::new();
        outbox.enqueue(Mutation::create(local::PAGES, object([("url", json!("a"))])));
        outbox.enqueue(Mutation::create(local::PAGES, object([("url", json!("b"))])));
        outbox.enqueue(Mutation::create(local::PAGES, object([("url", json!("c"))])));

        let batch = outbox.take_batch(2);
        assert_eq!(batch.len(), 2);
        outbox.requeue_front(batch);

        let again = outbox.take_batch(10);
        let urls: Vec<_> = again
            .iter()
            .map(|m| m.object.as_ref().unwrap().get("url").cloned().unwrap())
            .collect();
        assert_eq!(urls, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn wait_for_sync_returns_on_empty_and_on_halt() {
        let outbox = Outbox::new();
        assert!(outbox.wait_for_sync().is_ok());

        outbox.enqueue(Mutation::create(local::PAGES, object([("url", json!("a"))])));
        outbox.halt("backend gone");
        assert_eq!(outbox.wait_for_sync(), Err("backend gone".to_string()));
    }

    #[test]
    fn capture_ignores_silent_and_unsynced_writes() {
        let store = MemoryStore::new(local_registry().unwrap());
        let outbox = Arc::new(Outbox::new());
        store.register_handler(Arc::new(ChangeCapture::new(outbox.clone())));

        store
            .create(local::PAGES, object([("url", json!("a.com"))]))
            .unwrap();
        // Applied download: must not echo back.
        store
            .upsert_silent(local::PAGES, object([("url", json!("b.com"))]))
            .unwrap();

        assert_eq!(outbox.len(), 1);
    }
}
