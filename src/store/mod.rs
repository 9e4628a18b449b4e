//! Snapshot persistence.
//!
//! `KeyValueStore` is the backend seam; `SnapshotStore` layers the timer's
//! key scheme and failure policy on top of it. Storage faults are logged and
//! swallowed here so that a full disk or a corrupt entry never reaches the
//! tick loop.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TimerSnapshot;

pub mod memory;
mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn save(&self, key: &str, value: String) -> Result<()>;
    async fn load(&self, key: &str) -> Result<Option<String>>;
    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

pub fn snapshot_key(session_id: &str) -> String {
    format!("session_timer_{session_id}")
}

#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn save(&self, snapshot: &TimerSnapshot) {
        let key = snapshot_key(&snapshot.session_id);
        let serialized = match serde_json::to_string(snapshot) {
            Ok(serialized) => serialized,
            Err(err) => {
                log_warn!("Failed to serialize snapshot for {}: {err}", snapshot.session_id);
                return;
            }
        };

        if let Err(err) = self.backend.save(&key, serialized).await {
            log_warn!("Failed to save timer snapshot {key}: {err:#}");
        } else {
            log_debug!("Saved timer snapshot {key}");
        }
    }

    pub async fn restore(&self, session_id: &str) -> Option<TimerSnapshot> {
        let key = snapshot_key(session_id);
        let raw = match self.backend.load(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log_warn!("Failed to load timer snapshot {key}: {err:#}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("Ignoring malformed timer snapshot {key}: {err}");
                None
            }
        }
    }

    pub async fn clear(&self, session_id: &str) {
        let key = snapshot_key(session_id);
        if let Err(err) = self.backend.delete(&key).await {
            log_warn!("Failed to clear timer snapshot {key}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Phase, SessionSchedule};
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn save(&self, _key: &str, _value: String) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
        async fn load(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("storage disabled"))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(anyhow!("storage disabled"))
        }
    }

    fn snapshot() -> TimerSnapshot {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        let schedule = SessionSchedule::new("abc", at, 30, 15, 5).unwrap();
        TimerSnapshot::capture(&schedule, Some(Phase::Session), at)
    }

    #[test]
    fn key_is_prefixed_with_session_timer() {
        assert_eq!(snapshot_key("abc"), "session_timer_abc");
    }

    #[tokio::test]
    async fn save_restore_clear() {
        let store = SnapshotStore::in_memory();
        assert!(store.restore("abc").await.is_none());

        store.save(&snapshot()).await;
        assert_eq!(store.restore("abc").await, Some(snapshot()));

        store.clear("abc").await;
        assert!(store.restore("abc").await.is_none());
        store.clear("abc").await;
    }

    #[tokio::test]
    async fn malformed_entries_restore_as_none() {
        let backend = Arc::new(MemoryStore::new());
        backend.save("session_timer_abc", "{not json".into()).await.unwrap();
        let store = SnapshotStore::new(backend);
        assert!(store.restore("abc").await.is_none());
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let store = SnapshotStore::new(Arc::new(BrokenStore));
        store.save(&snapshot()).await;
        assert!(store.restore("abc").await.is_none());
        store.clear("abc").await;
    }
}
