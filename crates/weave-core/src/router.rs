//! Event broadcast routing.
//!
//! The router resolves recipients through the channel index and connection
//! registry and fans serialized events out to their sessions. Delivery is
//! best-effort per recipient: one dead socket never aborts the rest of a
//! broadcast, and a failed recipient is passively deregistered.

use crate::index::ChannelIndex;
use crate::registry::ConnectionRegistry;
use crate::{ChannelId, UserId};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use weave_protocol::{codec, Event, ProtocolError};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients whose session queue accepted the event.
    pub delivered: usize,
    /// Recipients with a live registration whose delivery failed.
    pub failed: usize,
}

/// Fan-out router over the registry and channel index.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    index: Arc<ChannelIndex>,
}

impl BroadcastRouter {
    /// Create a router over the given registry and index.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, index: Arc<ChannelIndex>) -> Self {
        Self { registry, index }
    }

    /// Broadcast an event to every subscriber of a channel, skipping
    /// `exclude` and anyone without a live connection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be serialized; per-recipient
    /// failures are reported in the [`DeliveryReport`].
    pub fn broadcast_to_channel(
        &self,
        event: &Event,
        channel: ChannelId,
        exclude: Option<UserId>,
    ) -> Result<DeliveryReport, ProtocolError> {
        let payload: Arc<str> = Arc::from(codec::encode_event(event)?);
        let mut report = DeliveryReport::default();

        for user in self.index.members_of(channel) {
            if Some(user) == exclude {
                continue;
            }
            self.deliver(&payload, user, &mut report);
        }

        trace!(channel, ?report, "Channel broadcast");
        Ok(report)
    }

    /// Send an event to a single user, if connected.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be serialized.
    pub fn broadcast_to_user(
        &self,
        event: &Event,
        user: UserId,
    ) -> Result<DeliveryReport, ProtocolError> {
        let payload: Arc<str> = Arc::from(codec::encode_event(event)?);
        let mut report = DeliveryReport::default();
        self.deliver(&payload, user, &mut report);
        Ok(report)
    }

    /// Broadcast an event to every connected user, skipping `exclude`.
    /// Used for global presence changes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be serialized.
    pub fn broadcast_to_all(
        &self,
        event: &Event,
        exclude: Option<UserId>,
    ) -> Result<DeliveryReport, ProtocolError> {
        let payload: Arc<str> = Arc::from(codec::encode_event(event)?);
        let mut report = DeliveryReport::default();

        for user in self.registry.snapshot() {
            if Some(user) == exclude {
                continue;
            }
            self.deliver(&payload, user, &mut report);
        }

        trace!(?report, "Global broadcast");
        Ok(report)
    }

    /// Attempt delivery to one user. A vanished or dead connection is a
    /// non-fatal delivery failure and triggers passive deregistration of
    /// exactly the failed registration.
    fn deliver(&self, payload: &Arc<str>, user: UserId, report: &mut DeliveryReport) {
        let Some(conn) = self.registry.lookup(user) else {
            debug!(user, "Recipient not connected, skipping");
            return;
        };

        match conn.send(Arc::clone(payload)) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(user, error = %e, "Delivery failed, deregistering");
                self.registry.deregister_if(user, conn.generation());
                report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Connection;
    use std::collections::HashSet;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (Arc<ConnectionRegistry>, Arc<ChannelIndex>, BroadcastRouter) {
        let registry = Arc::new(ConnectionRegistry::new());
        let index = Arc::new(ChannelIndex::new());
        let router = BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&index));
        (registry, index, router)
    }

    fn connect(registry: &ConnectionRegistry, user: UserId) -> UnboundedReceiver<Arc<str>> {
        let (conn, rx) = Connection::open(user);
        registry.register(conn);
        rx
    }

    fn roster(users: &[UserId]) -> HashSet<UserId> {
        users.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_channel_broadcast_excludes_originator() {
        let (registry, index, router) = setup();
        let mut rx1 = connect(&registry, 1);
        let mut rx2 = connect(&registry, 2);

        let members = roster(&[1, 2]);
        index.subscribe(1, 7, &members).unwrap();
        index.subscribe(2, 7, &members).unwrap();

        let report = router
            .broadcast_to_channel(&Event::presence_online(1), 7, Some(1))
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_one_dead_recipient_does_not_abort_broadcast() {
        let (registry, index, router) = setup();
        let rx1 = connect(&registry, 1);
        let mut rx2 = connect(&registry, 2);

        let members = roster(&[1, 2]);
        index.subscribe(1, 7, &members).unwrap();
        index.subscribe(2, 7, &members).unwrap();

        drop(rx1); // user 1's session task died without cleanup

        let report = router
            .broadcast_to_channel(&Event::presence_online(9), 7, None)
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(rx2.try_recv().is_ok());
        // The dead connection was passively deregistered.
        assert!(!registry.is_connected(1));
    }

    #[tokio::test]
    async fn test_broadcast_to_all_excludes_and_skips_unconnected() {
        let (registry, _index, router) = setup();
        let mut rx1 = connect(&registry, 1);
        let mut rx2 = connect(&registry, 2);
        let mut rx3 = connect(&registry, 3);

        let report = router
            .broadcast_to_all(&Event::presence_online(2), Some(2))
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_to_user_not_connected() {
        let (_registry, _index, router) = setup();
        let report = router
            .broadcast_to_user(&Event::Pong, 42)
            .unwrap();
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_subscribers_without_connection_are_skipped() {
        let (registry, index, router) = setup();
        let mut rx1 = connect(&registry, 1);

        // User 2 is a subscriber but never connected.
        let members = roster(&[1, 2]);
        index.subscribe(1, 7, &members).unwrap();
        index.subscribe(2, 7, &members).unwrap();
        registry.deregister(2);

        let report = router
            .broadcast_to_channel(&Event::presence_online(9), 7, None)
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert!(rx1.try_recv().is_ok());
    }
}
