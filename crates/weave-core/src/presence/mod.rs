//! User presence tracking.
//!
//! Presence records online/offline state and last-seen time per user. Two
//! interchangeable backends sit behind [`PresenceStore`]:
//!
//! - [`RedisPresence`] - durable shared store; online records carry a 300 s
//!   TTL, so an ungracefully terminated session drops off the online list
//!   without an explicit disconnect.
//! - [`MemoryPresence`] - process-local fallback with no automatic expiry;
//!   only an explicit `set_offline` transition changes a record. A known gap,
//!   accepted for the single-process case.
//!
//! The backend is chosen once at startup; callers see no difference beyond
//! expiry semantics.

mod memory;
mod redis;

pub use self::memory::MemoryPresence;
pub use self::redis::RedisPresence;

use crate::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// TTL on online presence records in the durable backend.
pub const ONLINE_TTL: Duration = Duration::from_secs(300);

/// Retention of offline records in the durable backend.
pub const OFFLINE_RETENTION: Duration = Duration::from_secs(86_400);

/// Presence backend errors.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The Redis backend failed.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A stored record could not be parsed.
    #[error("Malformed presence record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Presence state for a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// The user this record describes.
    pub user_id: UserId,
    /// Current online state.
    pub online: bool,
    /// Last activity or disconnect time; `None` if never seen.
    pub last_seen: Option<DateTime<Utc>>,
    /// When the current session started; `None` while offline.
    pub connected_at: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    /// A fresh online record stamped with the current time.
    #[must_use]
    pub fn online_now(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            online: true,
            last_seen: Some(now),
            connected_at: Some(now),
        }
    }

    /// An offline record stamped with the given disconnect time.
    #[must_use]
    pub fn offline_at(user_id: UserId, last_seen: DateTime<Utc>) -> Self {
        Self {
            user_id,
            online: false,
            last_seen: Some(last_seen),
            connected_at: None,
        }
    }

    /// The record returned for a user with no stored presence.
    #[must_use]
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            online: false,
            last_seen: None,
            connected_at: None,
        }
    }
}

/// Pluggable presence backend.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Write a fresh online record, refreshing the TTL where supported, and
    /// add the user to the online set.
    async fn set_online(&self, user_id: UserId) -> Result<(), PresenceError>;

    /// Remove the user from the online set and stamp `last_seen`. The record
    /// itself is retained so `last_seen` stays readable while offline.
    async fn set_offline(&self, user_id: UserId) -> Result<(), PresenceError>;

    /// Read a user's presence record.
    async fn get(&self, user_id: UserId) -> Result<PresenceRecord, PresenceError>;

    /// List the currently online user IDs.
    async fn list_online(&self) -> Result<Vec<UserId>, PresenceError>;

    /// Refresh a user's last-seen time (and TTL, where supported) without
    /// changing their online state. Driven by keepalive pings.
    async fn touch(&self, user_id: UserId) -> Result<(), PresenceError>;
}
