//! Outbound events.
//!
//! Events are server-pushed notifications fanned out by the broadcast router.
//! They are immutable once constructed and serialized exactly once per
//! broadcast; the router never rewrites payload content per recipient.

use crate::{ChannelId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message, as carried inside a `new_message` event.
///
/// The record itself is owned by the persistence collaborator; this is its
/// wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier assigned at persistence time.
    pub id: i64,
    /// Author of the message.
    pub sender_id: UserId,
    /// Channel the message was posted to.
    pub channel_id: ChannelId,
    /// Message body.
    pub body: String,
    /// Whether the message has been marked read.
    pub is_read: bool,
    /// Persistence commit time.
    pub created_at: DateTime<Utc>,
    /// Display name of the author, resolved by the persistence layer.
    pub sender_name: String,
}

/// An event pushed to connected clients.
///
/// Each variant knows its implicit exclusion target: the user whose action
/// produced the event, who is never re-notified of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A message was committed to a channel.
    #[serde(rename = "new_message")]
    NewMessage {
        /// The persisted message.
        message: ChatMessage,
    },

    /// A message was marked read.
    #[serde(rename = "read_receipt")]
    ReadReceipt {
        /// The message that was read.
        message_id: i64,
        /// The user who read it.
        user_id: UserId,
        /// When the read was recorded.
        timestamp: DateTime<Utc>,
    },

    /// A user came online or went offline.
    #[serde(rename = "presence_change")]
    PresenceChange {
        /// The user whose presence changed.
        user_id: UserId,
        /// New online state.
        online: bool,
        /// Last-seen time; `null` while the user is online.
        last_seen: Option<DateTime<Utc>>,
    },

    /// Keepalive reply to a client `ping` frame.
    #[serde(rename = "pong")]
    Pong,
}

impl Event {
    /// Create a `new_message` event.
    #[must_use]
    pub fn new_message(message: ChatMessage) -> Self {
        Event::NewMessage { message }
    }

    /// Create a `read_receipt` event stamped with the current time.
    #[must_use]
    pub fn read_receipt(message_id: i64, user_id: UserId) -> Self {
        Event::ReadReceipt {
            message_id,
            user_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a `presence_change` event for a user coming online.
    #[must_use]
    pub fn presence_online(user_id: UserId) -> Self {
        Event::PresenceChange {
            user_id,
            online: true,
            last_seen: None,
        }
    }

    /// Create a `presence_change` event for a user going offline.
    #[must_use]
    pub fn presence_offline(user_id: UserId, last_seen: DateTime<Utc>) -> Self {
        Event::PresenceChange {
            user_id,
            online: false,
            last_seen: Some(last_seen),
        }
    }

    /// The originating user, who must never receive this event back.
    #[must_use]
    pub fn originator(&self) -> Option<UserId> {
        match self {
            Event::NewMessage { message } => Some(message.sender_id),
            Event::ReadReceipt { user_id, .. } | Event::PresenceChange { user_id, .. } => {
                Some(*user_id)
            }
            Event::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> ChatMessage {
        ChatMessage {
            id: 42,
            sender_id: 1,
            channel_id: 7,
            body: "hello".into(),
            is_read: false,
            created_at: Utc::now(),
            sender_name: "alice".into(),
        }
    }

    #[test]
    fn test_new_message_shape() {
        let event = Event::new_message(sample_message());
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["type"], "new_message");
        assert_eq!(json["message"]["id"], 42);
        assert_eq!(json["message"]["sender_name"], "alice");
    }

    #[test]
    fn test_presence_change_shape() {
        let event = Event::presence_online(3);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["type"], "presence_change");
        assert_eq!(json["user_id"], 3);
        assert_eq!(json["online"], true);
        assert!(json["last_seen"].is_null());
    }

    #[test]
    fn test_originator() {
        assert_eq!(Event::new_message(sample_message()).originator(), Some(1));
        assert_eq!(Event::read_receipt(42, 2).originator(), Some(2));
        assert_eq!(Event::presence_online(3).originator(), Some(3));
        assert_eq!(Event::Pong.originator(), None);
    }
}
