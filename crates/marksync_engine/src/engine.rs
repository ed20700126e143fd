//! The device sync engine.

use std::sync::Arc;
use std::thread;

use crate::backend::CloudBackend;
use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::outbox::{ChangeCapture, Outbox};
use crate::settings::DeviceSettings;
use marksync_model::{ClientInstruction, DownloadRequest, Session, UpdateBatch};
use marksync_storage::MemoryStore;
use parking_lot::Mutex;

/// Background sync health, surfaced instead of thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Mutations the cloud accepted.
    pub mutations_pushed: u64,
    /// Mutations the cloud dropped as untranslatable.
    pub mutations_skipped: u64,
    /// Download instructions applied locally.
    pub instructions_applied: u64,
    /// The most recent failure message, transient or terminal.
    pub last_failure: Option<String>,
    /// Whether pushing stopped permanently; queued mutations are
    /// retained, never dropped.
    pub halted: bool,
}

/// One device's sync runtime over a local store and a cloud backend.
///
/// Local writes flow store → change capture → outbox → `push_pending`;
/// remote changes flow `pull` → instruction application → local store,
/// silently, so they are never captured back.
pub struct PersonalCloudEngine {
    session: Session,
    local: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
    backend: Arc<dyn CloudBackend>,
    settings: DeviceSettings,
    config: SyncConfig,
    status: Mutex<SyncStatus>,
}

impl PersonalCloudEngine {
    /// Builds an engine and registers change capture on `local`.
    pub fn new(
        session: Session,
        local: Arc<MemoryStore>,
        backend: Arc<dyn CloudBackend>,
        config: SyncConfig,
    ) -> Self {
        let outbox = Arc::new(Outbox::new());
        local.register_handler(Arc::new(ChangeCapture::new(outbox.clone())));
        let settings = DeviceSettings::new(local.clone());
        Self {
            session,
            local,
            outbox,
            backend,
            settings,
            config,
            status: Mutex::new(SyncStatus::default()),
        }
    }

    /// The device's local store.
    pub fn local(&self) -> &MemoryStore {
        &self.local
    }

    /// The device's outbox.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// The device's settings.
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// This device's session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A copy of the current background status.
    pub fn status(&self) -> SyncStatus {
        self.status.lock().clone()
    }

    /// Blocks until the outbox is drained or pushing halted.
    pub fn wait_for_sync(&self) -> EngineResult<()> {
        self.outbox.wait_for_sync().map_err(EngineError::Halted)
    }

    /// Drains the outbox, batch by batch, with retries.
    ///
    /// A batch that keeps failing is requeued in order and the engine
    /// halts: the failure lands in [`SyncStatus`], not in data loss.
    pub fn push_pending(&self) -> EngineResult<usize> {
        let mut total = 0;
        loop {
            let batch = self.outbox.take_batch(self.config.push_batch_size);
            if batch.is_empty() {
                return Ok(total);
            }
            match self.push_with_retry(&batch) {
                Ok(outcome) => {
                    total += outcome.applied;
                    let mut status = self.status.lock();
                    status.mutations_pushed += outcome.applied as u64;
                    status.mutations_skipped += outcome.skipped as u64;
                    drop(status);
                    self.outbox.complete_batch();
                }
                Err(err) => {
                    let reason = err.to_string();
                    self.outbox.requeue_front(batch);
                    self.outbox.halt(reason.clone());
                    let mut status = self.status.lock();
                    status.last_failure = Some(reason);
                    status.halted = true;
                    return Err(err);
                }
            }
        }
    }

    fn push_with_retry(
        &self,
        batch: &[marksync_storage::Mutation],
    ) -> EngineResult<marksync_server::PushOutcome> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.backend.push(&self.session, batch) {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        user = %self.session.user,
                        device = self.session.device,
                        attempt,
                        error = %err,
                        "push failed, backing off"
                    );
                    self.status.lock().last_failure = Some(err.to_string());
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Downloads and applies everything past the persisted watermark.
    ///
    /// The watermark advances only after a complete page has been
    /// applied; a crash mid-page re-pulls from the unchanged watermark
    /// and re-applies idempotent instructions.
    pub fn pull(&self) -> EngineResult<usize> {
        let since = self.settings.last_seen()?;
        let mut skip = 0;
        let mut applied = 0;
        loop {
            let request = DownloadRequest::new(
                self.session.user.clone(),
                self.session.device,
                since,
                self.config.schema_version,
            )
            .with_limit(self.config.pull_batch_size)
            .with_skip(skip);
            let batch = self.backend.pull(&request)?;
            applied += self.apply_batch(&batch)?;
            match batch.next_skip {
                Some(next) => skip = next,
                None => {
                    self.settings.set_last_seen(batch.last_seen)?;
                    self.status.lock().instructions_applied += applied as u64;
                    return Ok(applied);
                }
            }
        }
    }

    /// One full cycle: upload local changes, then apply remote ones.
    pub fn sync(&self) -> EngineResult<()> {
        self.push_pending()?;
        self.pull()?;
        Ok(())
    }

    fn apply_batch(&self, batch: &UpdateBatch) -> EngineResult<usize> {
        for instruction in &batch.updates {
            match instruction {
                ClientInstruction::Overwrite { collection, object } => {
                    self.local.upsert_silent(collection, object.clone())?;
                }
                ClientInstruction::Delete { collection, where_ } => {
                    self.local.delete_silent(collection, where_)?;
                }
            }
        }
        Ok(batch.updates.len())
    }
}
