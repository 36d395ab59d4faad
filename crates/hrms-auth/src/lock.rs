//! Cross-context refresh lock.
//!
//! Advisory only: two contexts can both see the lock free and both refresh.
//! The lock narrows that window; nothing relies on it being exclusive.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Default storage key of the lock.
pub const REFRESH_LOCK_KEY: &str = "hrms_refresh_lock";

/// A lock older than this is stale.
pub const REFRESH_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    /// Unix millis when the owner took the lock.
    timestamp: i64,
}

/// Timestamped lock in a medium shared across contexts.
#[derive(Clone)]
pub struct RefreshLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    timeout: Duration,
}

impl std::fmt::Debug for RefreshLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshLock")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RefreshLock {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: REFRESH_LOCK_KEY.to_string(),
            timeout: REFRESH_LOCK_TIMEOUT,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record that this context is refreshing.
    pub fn acquire(&self) {
        let record = LockRecord {
            timestamp: Utc::now().timestamp_millis(),
        };
        let value = match serde_json::to_string(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode refresh lock");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &value, None) {
            warn!(error = %e, "Failed to write refresh lock");
        }
    }

    /// Drop the lock, whoever holds it.
    pub fn release(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            warn!(error = %e, "Failed to clear refresh lock");
        }
    }

    /// True when a live lock exists. A stale lock is removed and reads as free;
    /// an unreadable one reads as free.
    pub fn is_held(&self) -> bool {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to read refresh lock");
                return false;
            }
        };

        let Ok(record) = serde_json::from_str::<LockRecord>(&raw) else {
            return false;
        };

        let age_ms = Utc::now().timestamp_millis().saturating_sub(record.timestamp);
        if age_ms > self.timeout.as_millis() as i64 {
            debug!(age_ms, "Removing stale refresh lock");
            self.release();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn lock() -> (Arc<MemoryStore>, RefreshLock) {
        let medium = Arc::new(MemoryStore::new());
        (medium.clone(), RefreshLock::new(medium))
    }

    #[test]
    fn test_acquire_and_release() {
        let (medium, lock) = lock();
        assert!(!lock.is_held());

        lock.acquire();
        assert!(lock.is_held());
        let raw = medium.get(REFRESH_LOCK_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["timestamp"].as_i64().unwrap() > 0);

        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_stale_lock_is_removed() {
        let (medium, lock) = lock();
        let old = Utc::now().timestamp_millis() - 16_000;
        medium
            .set(REFRESH_LOCK_KEY, &format!(r#"{{"timestamp":{old}}}"#), None)
            .unwrap();

        assert!(!lock.is_held());
        assert!(medium.get(REFRESH_LOCK_KEY).unwrap().is_none());
    }

    #[test]
    fn test_fresh_foreign_lock_is_held() {
        let (medium, lock) = lock();
        let recent = Utc::now().timestamp_millis() - 1_000;
        medium
            .set(REFRESH_LOCK_KEY, &format!(r#"{{"timestamp":{recent}}}"#), None)
            .unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn test_malformed_lock_reads_as_free() {
        let (medium, lock) = lock();
        medium.set(REFRESH_LOCK_KEY, "not json", None).unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_custom_key() {
        let (medium, lock) = lock();
        let lock = lock.with_key("tenant_a_lock");
        lock.acquire();
        assert!(medium.get("tenant_a_lock").unwrap().is_some());
        assert!(medium.get(REFRESH_LOCK_KEY).unwrap().is_none());
    }
}
