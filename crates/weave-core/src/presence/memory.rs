//! Process-local presence fallback.

use super::{PresenceError, PresenceRecord, PresenceStore};
use crate::UserId;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// In-process presence store.
///
/// No automatic expiry: a session that terminates without a disconnect
/// transition stays online until an explicit `set_offline`. This asymmetry
/// with the Redis backend is an accepted trade-off for the single-process
/// fallback, and is logged once at construction.
#[derive(Debug, Default)]
pub struct MemoryPresence {
    records: Mutex<HashMap<UserId, PresenceRecord>>,
}

impl MemoryPresence {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        warn!("Using in-memory presence: records never auto-expire without an explicit disconnect");
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresence {
    async fn set_online(&self, user_id: UserId) -> Result<(), PresenceError> {
        let mut records = self.records.lock().expect("presence map poisoned");
        records.insert(user_id, PresenceRecord::online_now(user_id));
        Ok(())
    }

    async fn set_offline(&self, user_id: UserId) -> Result<(), PresenceError> {
        let mut records = self.records.lock().expect("presence map poisoned");
        if let Some(record) = records.get_mut(&user_id) {
            record.online = false;
            record.last_seen = Some(Utc::now());
            record.connected_at = None;
        }
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<PresenceRecord, PresenceError> {
        let records = self.records.lock().expect("presence map poisoned");
        Ok(records
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| PresenceRecord::unknown(user_id)))
    }

    async fn list_online(&self) -> Result<Vec<UserId>, PresenceError> {
        let records = self.records.lock().expect("presence map poisoned");
        Ok(records
            .values()
            .filter(|r| r.online)
            .map(|r| r.user_id)
            .collect())
    }

    async fn touch(&self, user_id: UserId) -> Result<(), PresenceError> {
        let mut records = self.records.lock().expect("presence map poisoned");
        if let Some(record) = records.get_mut(&user_id) {
            record.last_seen = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_online_offline_transition() {
        let store = MemoryPresence::new();

        store.set_online(1).await.unwrap();
        let record = store.get(1).await.unwrap();
        assert!(record.online);
        assert!(record.connected_at.is_some());
        assert_eq!(store.list_online().await.unwrap(), vec![1]);

        store.set_offline(1).await.unwrap();
        let record = store.get(1).await.unwrap();
        assert!(!record.online);
        // last_seen survives the offline transition.
        assert!(record.last_seen.is_some());
        assert!(record.connected_at.is_none());
        assert!(store.list_online().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_reads_as_offline() {
        let store = MemoryPresence::new();
        let record = store.get(99).await.unwrap();
        assert!(!record.online);
        assert!(record.last_seen.is_none());
    }

    #[tokio::test]
    async fn test_touch_refreshes_last_seen() {
        let store = MemoryPresence::new();
        store.set_online(1).await.unwrap();
        let before = store.get(1).await.unwrap().last_seen.unwrap();

        store.touch(1).await.unwrap();
        let after = store.get(1).await.unwrap().last_seen.unwrap();
        assert!(after >= before);

        // Touching an unknown user is a no-op.
        store.touch(99).await.unwrap();
        assert!(store.get(99).await.unwrap().last_seen.is_none());
    }

    #[tokio::test]
    async fn test_offline_unknown_user_is_noop() {
        let store = MemoryPresence::new();
        store.set_offline(42).await.unwrap();
        assert!(store.get(42).await.unwrap().last_seen.is_none());
    }
}
