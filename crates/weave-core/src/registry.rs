//! Connection registry.
//!
//! Maps a user identity to exactly one live connection. A new registration
//! for the same user supersedes the old one; writes through the superseded
//! handle fail as [`DeliveryError`], never panic.

use crate::UserId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Atomic counter distinguishing a superseded connection from its successor.
static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Delivery errors.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The target connection has already terminated.
    #[error("Connection for user {0} is closed")]
    Closed(UserId),

    /// The target user has no live connection.
    #[error("User {0} is not connected")]
    NotConnected(UserId),
}

/// A handle to one user's live connection.
///
/// The handle carries the sending half of the session's outbound queue;
/// the session task owns the receiving half and writes to the socket, so
/// delivery through the registry never blocks on socket I/O.
#[derive(Debug, Clone)]
pub struct Connection {
    user_id: UserId,
    generation: u64,
    sender: mpsc::UnboundedSender<Arc<str>>,
}

impl Connection {
    /// Open a connection handle plus the outbound queue its session drains.
    #[must_use]
    pub fn open(user_id: UserId) -> (Self, mpsc::UnboundedReceiver<Arc<str>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                user_id,
                generation: next_generation(),
                sender,
            },
            receiver,
        )
    }

    /// The user this connection belongs to.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The registration generation of this connection.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue serialized event text for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Closed`] if the session task has terminated.
    pub fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.sender
            .send(payload)
            .map_err(|_| DeliveryError::Closed(self.user_id))
    }

    /// Whether the session task has already gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registry of live connections, one per user.
///
/// All operations are safe under concurrent calls from independent sessions;
/// only map mutation happens under the internal shard locks.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding any prior one for the same user.
    ///
    /// Returns the superseded connection, if any. Dropping it closes the old
    /// session's outbound queue, which terminates that session's loop.
    pub fn register(&self, conn: Connection) -> Option<Connection> {
        let user_id = conn.user_id();
        let previous = self.connections.insert(user_id, conn);
        if previous.is_some() {
            debug!(user = user_id, "Superseding existing connection");
        }
        debug!(user = user_id, "Connection registered");
        previous
    }

    /// Remove a user's connection unconditionally.
    ///
    /// Returns `true` if a connection was present.
    pub fn deregister(&self, user_id: UserId) -> bool {
        let removed = self.connections.remove(&user_id).is_some();
        if removed {
            debug!(user = user_id, "Connection deregistered");
        }
        removed
    }

    /// Remove a user's connection only if it is still the given generation.
    ///
    /// A superseded session's cleanup uses this so it never evicts the
    /// registration of the session that replaced it.
    pub fn deregister_if(&self, user_id: UserId, generation: u64) -> bool {
        self.connections
            .remove_if(&user_id, |_, conn| conn.generation() == generation)
            .is_some()
    }

    /// Look up a user's live connection.
    #[must_use]
    pub fn lookup(&self, user_id: UserId) -> Option<Connection> {
        self.connections.get(&user_id).map(|c| c.clone())
    }

    /// Whether the user currently has a live connection.
    #[must_use]
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Snapshot of all currently connected user IDs.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
