//! Event ingestion from the persistence collaborator.
//!
//! The HTTP layer calls these synchronously after a successful persistence
//! write, so per-channel delivery order equals commit order. Broadcast
//! failures are absorbed into counters; nothing here propagates an error
//! back into the request path.

use crate::handlers::AppState;
use crate::metrics;
use tracing::error;
use weave_core::{ChannelId, DeliveryReport, UserId};
use weave_protocol::{ChatMessage, Event};

impl AppState {
    /// A message was committed to a channel. Fans a `new_message` event out
    /// to the channel's subscribers, excluding the sender.
    pub fn on_message_created(&self, message: ChatMessage) -> DeliveryReport {
        let channel = message.channel_id;
        let sender = message.sender_id;
        let event = Event::new_message(message);

        match self.router.broadcast_to_channel(&event, channel, Some(sender)) {
            Ok(report) => {
                metrics::record_broadcast("new_message", report);
                report
            }
            Err(e) => {
                error!(channel, error = %e, "new_message broadcast failed");
                DeliveryReport::default()
            }
        }
    }

    /// A message was marked read. Fans a `read_receipt` event out to the
    /// channel's subscribers, excluding the reader.
    pub fn on_message_read(
        &self,
        message_id: i64,
        reader: UserId,
        channel: ChannelId,
    ) -> DeliveryReport {
        let event = Event::read_receipt(message_id, reader);

        match self.router.broadcast_to_channel(&event, channel, Some(reader)) {
            Ok(report) => {
                metrics::record_broadcast("read_receipt", report);
                report
            }
            Err(e) => {
                error!(channel, message_id, error = %e, "read_receipt broadcast failed");
                DeliveryReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PresenceBackend};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use weave_core::{Connection, StaticDirectory};

    async fn test_state() -> Arc<AppState> {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_channel(7, [1, 2]);

        let mut config = Config::default();
        config.presence.backend = PresenceBackend::Memory;

        Arc::new(AppState::new(&config, directory.clone(), directory).await)
    }

    async fn join(state: &AppState, user: UserId, channel: ChannelId) -> UnboundedReceiver<Arc<str>> {
        let (conn, rx) = Connection::open(user);
        state.registry.register(conn);
        let members = state.directory.list_members(channel).await.unwrap();
        state.index.subscribe(user, channel, &members).unwrap();
        rx
    }

    fn message(sender: UserId, channel: ChannelId) -> ChatMessage {
        ChatMessage {
            id: 100,
            sender_id: sender,
            channel_id: channel,
            body: "hello".into(),
            is_read: false,
            created_at: Utc::now(),
            sender_name: "alice".into(),
        }
    }

    #[tokio::test]
    async fn test_new_message_reaches_other_subscribers_only() {
        let state = test_state().await;
        let mut rx1 = join(&state, 1, 7).await;
        let mut rx2 = join(&state, 2, 7).await;

        let report = state.on_message_created(message(1, 7));
        assert_eq!(report.delivered, 1);

        let event = rx2.try_recv().unwrap();
        assert!(event.contains(r#""type":"new_message""#));
        assert!(event.contains(r#""body":"hello""#));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_receipt_excludes_reader() {
        let state = test_state().await;
        let mut rx1 = join(&state, 1, 7).await;
        let mut rx2 = join(&state, 2, 7).await;

        let report = state.on_message_read(100, 2, 7);
        assert_eq!(report.delivered, 1);

        let event = rx1.try_recv().unwrap();
        assert!(event.contains(r#""type":"read_receipt""#));
        assert!(event.contains(r#""message_id":100"#));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_in_channel_delivery_preserves_commit_order() {
        let state = test_state().await;
        let _rx1 = join(&state, 1, 7).await;
        let mut rx2 = join(&state, 2, 7).await;

        for id in [100, 101, 102] {
            let mut msg = message(1, 7);
            msg.id = id;
            state.on_message_created(msg);
        }

        for id in [100, 101, 102] {
            let event = rx2.try_recv().unwrap();
            assert!(event.contains(&format!(r#""id":{id}"#)));
        }
    }
}
