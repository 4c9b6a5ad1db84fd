//! Channel subscription index.
//!
//! Bidirectional mapping between channels and their subscribed users,
//! mirrored from persisted membership for the lifetime of active sessions.
//! The index never grants membership on its own; callers pass in the
//! persisted member set and [`ChannelIndex::subscribe`] rejects anyone not
//! in it.
//!
//! Both directions live under one mutex so every mutation, including
//! [`ChannelIndex::drop_user`], is atomic and the invariant
//! `u ∈ members_of(c) ⟺ c ∈ channels_of(u)` holds after each one.

use crate::{ChannelId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error};

/// Subscription rejected: the user has no persisted membership in the channel.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("User {user} is not a member of channel {channel}")]
pub struct MembershipError {
    /// The rejected user.
    pub user: UserId,
    /// The channel they tried to subscribe to.
    pub channel: ChannelId,
}

#[derive(Debug, Default)]
struct Inner {
    /// channel -> subscribed users
    members: HashMap<ChannelId, HashSet<UserId>>,
    /// user -> subscribed channels
    subscriptions: HashMap<UserId, HashSet<ChannelId>>,
}

impl Inner {
    /// Structural check of the bidirectional invariant.
    fn is_consistent(&self) -> bool {
        self.members.iter().all(|(channel, users)| {
            users.iter().all(|user| {
                self.subscriptions
                    .get(user)
                    .is_some_and(|channels| channels.contains(channel))
            })
        }) && self.subscriptions.iter().all(|(user, channels)| {
            channels.iter().all(|channel| {
                self.members
                    .get(channel)
                    .is_some_and(|users| users.contains(user))
            })
        })
    }
}

/// In-memory channel ↔ subscriber index.
#[derive(Debug, Default)]
pub struct ChannelIndex {
    inner: Mutex<Inner>,
}

impl ChannelIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a user to a channel, validated against the persisted
    /// member set supplied by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] if the user is not in `persisted_members`;
    /// the index is left unchanged.
    pub fn subscribe(
        &self,
        user: UserId,
        channel: ChannelId,
        persisted_members: &HashSet<UserId>,
    ) -> Result<(), MembershipError> {
        if !persisted_members.contains(&user) {
            return Err(MembershipError { user, channel });
        }

        let mut inner = self.inner.lock().expect("channel index poisoned");
        inner.members.entry(channel).or_default().insert(user);
        inner.subscriptions.entry(user).or_default().insert(channel);
        self.check_invariant(&inner);

        debug!(user, channel, "Subscribed");
        Ok(())
    }

    /// Unsubscribe a user from a channel. A no-op if not subscribed.
    pub fn unsubscribe(&self, user: UserId, channel: ChannelId) {
        let mut inner = self.inner.lock().expect("channel index poisoned");
        if let Some(users) = inner.members.get_mut(&channel) {
            users.remove(&user);
            if users.is_empty() {
                inner.members.remove(&channel);
            }
        }
        if let Some(channels) = inner.subscriptions.get_mut(&user) {
            channels.remove(&channel);
            if channels.is_empty() {
                inner.subscriptions.remove(&user);
            }
        }
        self.check_invariant(&inner);

        debug!(user, channel, "Unsubscribed");
    }

    /// Remove a user from every channel's member set and clear their
    /// subscription set in one atomic step. Used on disconnect.
    pub fn drop_user(&self, user: UserId) {
        let mut inner = self.inner.lock().expect("channel index poisoned");
        if let Some(channels) = inner.subscriptions.remove(&user) {
            for channel in channels {
                if let Some(users) = inner.members.get_mut(&channel) {
                    users.remove(&user);
                    if users.is_empty() {
                        inner.members.remove(&channel);
                    }
                }
            }
        }
        self.check_invariant(&inner);

        debug!(user, "Dropped from all channels");
    }

    /// The set of users currently subscribed to a channel.
    #[must_use]
    pub fn members_of(&self, channel: ChannelId) -> HashSet<UserId> {
        let inner = self.inner.lock().expect("channel index poisoned");
        inner.members.get(&channel).cloned().unwrap_or_default()
    }

    /// The set of channels a user is currently subscribed to.
    #[must_use]
    pub fn channels_of(&self, user: UserId) -> HashSet<ChannelId> {
        let inner = self.inner.lock().expect("channel index poisoned");
        inner
            .subscriptions
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    /// Structural verification of the bidirectional invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.inner
            .lock()
            .expect("channel index poisoned")
            .is_consistent()
    }

    /// A broken invariant is an internal defect, unreachable given correct
    /// mutation discipline. Logged loudly and asserted in debug builds.
    fn check_invariant(&self, inner: &Inner) {
        if cfg!(debug_assertions) && !inner.is_consistent() {
            error!("Channel index bidirectional invariant violated");
            debug_assert!(false, "channel index bidirectional invariant violated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(users: &[UserId]) -> HashSet<UserId> {
        users.iter().copied().collect()
    }

    #[test]
    fn test_subscribe_requires_persisted_membership() {
        let index = ChannelIndex::new();

        assert_eq!(
            index.subscribe(3, 7, &members(&[1, 2])),
            Err(MembershipError { user: 3, channel: 7 })
        );
        assert!(index.members_of(7).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let index = ChannelIndex::new();
        let roster = members(&[1, 2]);

        index.subscribe(1, 7, &roster).unwrap();
        index.subscribe(2, 7, &roster).unwrap();

        assert_eq!(index.members_of(7), members(&[1, 2]));
        assert_eq!(index.channels_of(1), [7].into_iter().collect());
        assert!(index.is_consistent());

        index.unsubscribe(1, 7);
        assert_eq!(index.members_of(7), members(&[2]));
        assert!(index.channels_of(1).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_unsubscribe_not_subscribed_is_noop() {
        let index = ChannelIndex::new();
        index.unsubscribe(1, 7);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_drop_user_clears_both_directions() {
        let index = ChannelIndex::new();
        let roster = members(&[1, 2]);

        index.subscribe(1, 7, &roster).unwrap();
        index.subscribe(1, 8, &roster).unwrap();
        index.subscribe(2, 7, &roster).unwrap();

        index.drop_user(1);

        assert!(index.channels_of(1).is_empty());
        assert_eq!(index.members_of(7), members(&[2]));
        assert!(index.members_of(8).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_invariant_holds_under_interleaved_mutations() {
        let index = ChannelIndex::new();
        let roster = members(&[1, 2, 3]);

        for user in 1..=3 {
            for channel in 10..13 {
                index.subscribe(user, channel, &roster).unwrap();
            }
        }
        index.unsubscribe(2, 11);
        index.drop_user(3);
        index.subscribe(3, 12, &roster).unwrap();

        assert!(index.is_consistent());
        assert_eq!(index.members_of(11), members(&[1]));
        assert_eq!(index.channels_of(3), [12].into_iter().collect());
    }
}
