//! A multi-device world over one in-process hub.

use std::sync::Arc;

use crate::clock::TestClock;
use marksync_engine::{LoopbackBackend, PersonalCloudEngine, RetryConfig, SyncConfig};
use marksync_model::{local_registry, Session};
use marksync_server::CloudHub;
use marksync_storage::{MemoryStore, Object, WherePattern};

/// The user every plain `SyncHarness::new` device belongs to.
pub const DEFAULT_USER: &str = "alice";

/// N devices, each with its own local store and engine, sharing one
/// [`CloudHub`] and one [`TestClock`].
pub struct SyncHarness {
    clock: Arc<TestClock>,
    hub: Arc<CloudHub>,
    devices: Vec<PersonalCloudEngine>,
}

impl SyncHarness {
    /// Builds `device_count` devices for [`DEFAULT_USER`].
    pub fn new(device_count: usize) -> Self {
        Self::with_config(device_count, SyncConfig::default().with_retry(RetryConfig::no_retry()))
    }

    /// Builds devices with a custom engine configuration.
    pub fn with_config(device_count: usize, config: SyncConfig) -> Self {
        let clock = Arc::new(TestClock::new(1_000));
        let hub = Arc::new(CloudHub::new(clock.clone()).expect("hub construction"));
        let mut harness = Self {
            clock,
            hub,
            devices: Vec::new(),
        };
        for _ in 0..device_count {
            harness.add_device_with(DEFAULT_USER, config.clone());
        }
        harness
    }

    /// Adds a device for another user, returning its index.
    pub fn add_device(&mut self, user: &str) -> usize {
        self.add_device_with(
            user,
            SyncConfig::default().with_retry(RetryConfig::no_retry()),
        )
    }

    fn add_device_with(&mut self, user: &str, config: SyncConfig) -> usize {
        let device_id = self.devices.len() as u64 + 1;
        let engine = PersonalCloudEngine::new(
            Session::new(user, device_id),
            Arc::new(MemoryStore::new(local_registry().expect("local registry"))),
            Arc::new(LoopbackBackend::new(self.hub.clone())),
            config,
        );
        self.devices.push(engine);
        self.devices.len() - 1
    }

    /// The shared hub.
    pub fn hub(&self) -> &Arc<CloudHub> {
        &self.hub
    }

    /// The shared clock.
    pub fn clock(&self) -> &TestClock {
        &self.clock
    }

    /// The engine of device `index`.
    pub fn device(&self, index: usize) -> &PersonalCloudEngine {
        &self.devices[index]
    }

    /// The local store of device `index`.
    pub fn local(&self, index: usize) -> &MemoryStore {
        self.devices[index].local()
    }

    /// Pushes and pulls every device until all of them have seen every
    /// change produced so far, including hook side effects.
    pub fn converge(&self) {
        for device in &self.devices {
            device.sync().expect("sync");
        }
        // Devices earlier in the order pull what later ones pushed.
        for device in &self.devices {
            device.pull().expect("pull");
        }
    }

    /// Rows of a local collection on device `index`.
    pub fn rows(&self, index: usize, collection: &str) -> Vec<Object> {
        self.devices[index]
            .local()
            .find(collection, &WherePattern::new())
            .expect("find")
    }

    /// Row count of a local collection on device `index`.
    pub fn count(&self, index: usize, collection: &str) -> usize {
        self.rows(index, collection).len()
    }

    /// Rows of a canonical or shared collection on the hub.
    pub fn canonical_rows(&self, collection: &str) -> Vec<Object> {
        self.hub
            .store()
            .find(collection, &WherePattern::new())
            .expect("find")
    }
}
