//! Collaborator seams.
//!
//! The fabric never owns users, channels, or messages; it consumes them
//! through these traits. The HTTP/persistence layer provides the real
//! implementations, while [`StaticDirectory`] backs tests and the
//! standalone binary.

use crate::{ChannelId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

/// Identity could not be resolved on connect. The session is closed
/// immediately and never enters its active state.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unresolvable identity: user {0}")]
pub struct AuthError(pub UserId);

/// Directory lookup errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The channel does not exist.
    #[error("Channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// The backing store failed.
    #[error("Directory backend error: {0}")]
    Backend(String),
}

/// Persisted channel membership, owned by the persistence collaborator.
#[async_trait]
pub trait Directory: Send + Sync {
    /// The persisted member set of a channel.
    async fn list_members(&self, channel: ChannelId) -> Result<HashSet<UserId>, DirectoryError>;
}

/// Identity verification, owned by the user-management collaborator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify that the claimed identity exists and may open a session.
    async fn authenticate(&self, user: UserId) -> Result<(), AuthError>;
}

/// Fixed in-memory directory and authenticator.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    inner: Mutex<StaticInner>,
}

#[derive(Debug, Default)]
struct StaticInner {
    users: HashSet<UserId>,
    channels: HashMap<ChannelId, HashSet<UserId>>,
}

impl StaticDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a known user.
    pub fn add_user(&self, user: UserId) {
        self.inner
            .lock()
            .expect("directory poisoned")
            .users
            .insert(user);
    }

    /// Register a channel with its member set. Members become known users.
    pub fn add_channel(&self, channel: ChannelId, members: impl IntoIterator<Item = UserId>) {
        let mut inner = self.inner.lock().expect("directory poisoned");
        let members: HashSet<UserId> = members.into_iter().collect();
        inner.users.extend(members.iter().copied());
        inner.channels.insert(channel, members);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn list_members(&self, channel: ChannelId) -> Result<HashSet<UserId>, DirectoryError> {
        let inner = self.inner.lock().expect("directory poisoned");
        inner
            .channels
            .get(&channel)
            .cloned()
            .ok_or(DirectoryError::ChannelNotFound(channel))
    }
}

#[async_trait]
impl Authenticator for StaticDirectory {
    async fn authenticate(&self, user: UserId) -> Result<(), AuthError> {
        let inner = self.inner.lock().expect("directory poisoned");
        if inner.users.contains(&user) {
            Ok(())
        } else {
            Err(AuthError(user))
        }
    }
}
