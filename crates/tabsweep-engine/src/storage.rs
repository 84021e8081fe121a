//! Key-value storage seam.
//!
//! Two storage areas exist by contract: a synchronized scope for settings
//! and a local scope for the activity table, the closure history, and the
//! notification queue. Both speak `serde_json::Value` so a malformed record
//! can be tolerated value-by-value instead of failing a whole read.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Keys of the synchronized settings record.
pub mod sync_keys {
    pub const TIMEOUT_MINUTES: &str = "timeoutMinutes";
    pub const FULL_CLEANUP_MINUTES: &str = "fullCleanupMinutes";
    pub const FULL_CLEANUP_ENABLED: &str = "fullCleanupEnabled";
    pub const WHITELIST: &str = "whitelist";
}

/// Keys of the local records.
pub mod local_keys {
    pub const TAB_ACTIVITY: &str = "tabActivity";
    pub const RECENTLY_REMOVED: &str = "recentlyRemoved";
    pub const TAB_REMOVED_NOTIFICATIONS: &str = "tabRemovedNotifications";
    pub const LAST_NOTIFICATION_CHECK: &str = "lastNotificationCheck";
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// One key-value storage scope. Implementations wrap whatever the host
/// actually persists to; all I/O may suspend.
#[async_trait]
pub trait StorageArea: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage area backed by a map. The embeddable default, and what
/// the integration tests run against.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key, for tests that need pre-existing stored state.
    pub async fn seed(&self, key: &str, value: Value) {
        self.values.lock().await.insert(key.to_string(), value);
    }
}

#[async_trait]
impl StorageArea for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}
