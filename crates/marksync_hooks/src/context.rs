//! Shared state handed to every hook.

use std::sync::Arc;

use marksync_model::Clock;
use marksync_storage::MemoryStore;
use marksync_translation::{CanonicalWriter, ChangeSink};

/// Store, change log, and clock access for hooks.
///
/// Hooks run inside the commit that woke them, so they hold the same
/// store and sink the translation layer writes through. Writers built
/// here carry no device id: a hook acts for the server, and its changes
/// must reach every device, including the one whose upload triggered
/// the hook.
pub struct HookContext {
    store: Arc<MemoryStore>,
    sink: Arc<dyn ChangeSink>,
    clock: Arc<dyn Clock>,
}

impl HookContext {
    /// Bundles the canonical store, change sink, and clock.
    pub fn new(store: Arc<MemoryStore>, sink: Arc<dyn ChangeSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, sink, clock }
    }

    /// The canonical store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Current wall-clock time in epoch milliseconds.
    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// A deviceless writer acting on behalf of `user`.
    pub fn writer_for<'a>(&'a self, user: &'a str) -> CanonicalWriter<'a> {
        CanonicalWriter::new(&self.store, self.sink.as_ref(), user, None, self.clock.now_ms())
    }
}
