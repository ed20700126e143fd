//! Device-scoped persistence in the local settings collection.

use std::sync::Arc;

use crate::error::EngineResult;
use marksync_model::local;
use marksync_storage::{object, MemoryStore, Value};
use serde_json::json;

/// Keys under this prefix are device bookkeeping. They are written
/// silently, so change capture never sees them and they never sync.
const DEVICE_PREFIX: &str = "@device/";

const LAST_SEEN_KEY: &str = "@device/last_seen";

/// The synced setting the server's Readwise hook is gated on.
pub const READWISE_API_KEY_SETTING: &str = "readwise.apiKey";

/// Typed access to device bookkeeping stored alongside user settings.
#[derive(Clone)]
pub struct DeviceSettings {
    store: Arc<MemoryStore>,
}

impl DeviceSettings {
    /// Wraps the device's local store.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Reads a device-scoped value.
    pub fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        let key = format!("{DEVICE_PREFIX}{key}");
        Ok(self
            .store
            .find_one(local::SETTINGS, &object([("key", json!(key))]))?
            .and_then(|row| row.get("value").cloned()))
    }

    /// Writes a device-scoped value, silently.
    pub fn set(&self, key: &str, value: Value) -> EngineResult<()> {
        let key = format!("{DEVICE_PREFIX}{key}");
        self.store.upsert_silent(
            local::SETTINGS,
            object([("key", json!(key)), ("value", value)]),
        )?;
        Ok(())
    }

    /// The download watermark: the highest change-log `seq` this device
    /// has fully applied.
    pub fn last_seen(&self) -> EngineResult<u64> {
        Ok(self
            .store
            .find_one(local::SETTINGS, &object([("key", json!(LAST_SEEN_KEY))]))?
            .and_then(|row| row.get("value").and_then(Value::as_u64))
            .unwrap_or(0))
    }

    /// Advances the download watermark. Called only after a complete
    /// page of instructions has been applied.
    pub fn set_last_seen(&self, seq: u64) -> EngineResult<()> {
        self.store.upsert_silent(
            local::SETTINGS,
            object([("key", json!(LAST_SEEN_KEY)), ("value", json!(seq))]),
        )?;
        Ok(())
    }

    /// The user's Readwise API key, if configured on this device.
    pub fn readwise_api_key(&self) -> EngineResult<Option<String>> {
        Ok(self
            .store
            .find_one(
                local::SETTINGS,
                &object([("key", json!(READWISE_API_KEY_SETTING))]),
            )?
            .and_then(|row| row.get("value").and_then(Value::as_str).map(String::from)))
    }

    /// Stores the Readwise API key as a normal, loud setting write, so
    /// it syncs to the cloud and arms the server-side export hook.
    pub fn set_readwise_api_key(&self, key: &str) -> EngineResult<()> {
        self.store.create(
            local::SETTINGS,
            object([
                ("key", json!(READWISE_API_KEY_SETTING)),
                ("value", json!(key)),
            ]),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksync_model::local_registry;

    fn settings() -> DeviceSettings {
        DeviceSettings::new(Arc::new(MemoryStore::new(local_registry().unwrap())))
    }

    #[test]
    fn watermark_starts_at_zero_and_persists() {
        let settings = settings();
        assert_eq!(settings.last_seen().unwrap(), 0);
        settings.set_last_seen(42).unwrap();
        assert_eq!(settings.last_seen().unwrap(), 42);
    }

    #[test]
    fn device_keys_are_namespaced() {
        let settings = settings();
        settings.set("theme", json!("dark")).unwrap();
        assert_eq!(settings.get("theme").unwrap(), Some(json!("dark")));
        // The raw key is hidden behind the prefix.
        assert!(settings
            .store
            .find_one(local::SETTINGS, &object([("key", json!("theme"))]))
            .unwrap()
            .is_none());
    }
}
