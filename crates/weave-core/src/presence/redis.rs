//! Redis-backed presence store.
//!
//! Layout mirrors one key per user plus one set of online users:
//!
//! - `presence:user:{id}` - JSON [`PresenceRecord`], `SETEX` 300 s while
//!   online, 24 h retention once offline
//! - `presence:online_users` - set of online user IDs
//!
//! No local lock is held around Redis calls; single-key and set operations
//! rely on Redis's own atomicity.

use super::{PresenceError, PresenceRecord, PresenceStore, OFFLINE_RETENTION, ONLINE_TTL};
use crate::UserId;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

const ONLINE_SET_KEY: &str = "presence:online_users";

fn user_key(user_id: UserId) -> String {
    format!("presence:user:{user_id}")
}

/// Durable presence store backed by Redis.
#[derive(Clone)]
pub struct RedisPresence {
    conn: ConnectionManager,
}

impl RedisPresence {
    /// Connect to Redis and verify the connection with a ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, PresenceError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Connected to Redis for presence storage");
        Ok(Self { conn })
    }

    async fn write_record(
        &self,
        record: &PresenceRecord,
        ttl_secs: u64,
    ) -> Result<(), PresenceError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(user_key(record.user_id), payload, ttl_secs)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for RedisPresence {
    async fn set_online(&self, user_id: UserId) -> Result<(), PresenceError> {
        self.write_record(&PresenceRecord::online_now(user_id), ONLINE_TTL.as_secs())
            .await?;
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(ONLINE_SET_KEY, user_id).await?;
        Ok(())
    }

    async fn set_offline(&self, user_id: UserId) -> Result<(), PresenceError> {
        self.write_record(
            &PresenceRecord::offline_at(user_id, Utc::now()),
            OFFLINE_RETENTION.as_secs(),
        )
        .await?;
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(ONLINE_SET_KEY, user_id).await?;
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<PresenceRecord, PresenceError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(user_key(user_id)).await?;
        match raw {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(PresenceRecord::unknown(user_id)),
        }
    }

    async fn list_online(&self) -> Result<Vec<UserId>, PresenceError> {
        let mut conn = self.conn.clone();
        let members: Vec<UserId> = conn.smembers(ONLINE_SET_KEY).await?;

        // The TTL lives on the per-user record, not the set. A member whose
        // record has expired (ungraceful termination) or flipped offline is
        // stale: filter it out and prune the set entry.
        let mut online = Vec::with_capacity(members.len());
        for user_id in members {
            if self.get(user_id).await?.online {
                online.push(user_id);
            } else {
                conn.srem::<_, _, ()>(ONLINE_SET_KEY, user_id).await?;
            }
        }
        Ok(online)
    }

    async fn touch(&self, user_id: UserId) -> Result<(), PresenceError> {
        let mut record = self.get(user_id).await?;
        if record.online {
            record.last_seen = Some(Utc::now());
            // Rewriting the record resets the online TTL.
            self.write_record(&record, ONLINE_TTL.as_secs()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a local Redis; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore = "requires a running Redis at redis://127.0.0.1:6379"]
    async fn test_online_roundtrip_against_redis() {
        let store = RedisPresence::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();

        store.set_online(990_001).await.unwrap();
        assert!(store.get(990_001).await.unwrap().online);
        assert!(store.list_online().await.unwrap().contains(&990_001));

        store.set_offline(990_001).await.unwrap();
        let record = store.get(990_001).await.unwrap();
        assert!(!record.online);
        assert!(record.last_seen.is_some());
        assert!(!store.list_online().await.unwrap().contains(&990_001));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at redis://127.0.0.1:6379"]
    async fn test_expired_record_drops_out_of_online_set() {
        let store = RedisPresence::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();

        store.set_online(990_002).await.unwrap();
        assert!(store.list_online().await.unwrap().contains(&990_002));

        // Stand in for the 300 s TTL elapsing without refresh.
        let mut conn = store.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(user_key(990_002))
            .query_async(&mut conn)
            .await
            .unwrap();

        assert!(!store.list_online().await.unwrap().contains(&990_002));

        // The stale set entry was pruned, not merely filtered.
        let raw: Vec<UserId> = conn.smembers(ONLINE_SET_KEY).await.unwrap();
        assert!(!raw.contains(&990_002));
    }
}
