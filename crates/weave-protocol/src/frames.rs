//! Inbound control frames.
//!
//! Clients drive their session with a small set of JSON control frames.
//! Anything with an unrecognized `"type"` decodes to [`ClientFrame::Unknown`]
//! and is ignored by the session handler rather than treated as fatal.

use crate::ChannelId;
use serde::{Deserialize, Serialize};

/// A control frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Subscribe to a channel's event stream.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// Channel to subscribe to.
        channel_id: ChannelId,
    },

    /// Unsubscribe from a channel's event stream.
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        /// Channel to unsubscribe from.
        channel_id: ChannelId,
    },

    /// Keepalive. Refreshes presence, answered with a `pong` event.
    #[serde(rename = "ping")]
    Ping,

    /// Any frame type this server does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// Create a new Subscribe frame.
    #[must_use]
    pub fn subscribe(channel_id: ChannelId) -> Self {
        ClientFrame::Subscribe { channel_id }
    }

    /// Create a new Unsubscribe frame.
    #[must_use]
    pub fn unsubscribe(channel_id: ChannelId) -> Self {
        ClientFrame::Unsubscribe { channel_id }
    }

    /// The channel this frame targets, if any.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            ClientFrame::Subscribe { channel_id } | ClientFrame::Unsubscribe { channel_id } => {
                Some(*channel_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_roundtrip() {
        let json = r#"{"type":"subscribe","channel_id":7}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame, ClientFrame::subscribe(7));
        assert_eq!(frame.channel_id(), Some(7));
    }

    #[test]
    fn test_ping_has_no_channel() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);
        assert_eq!(frame.channel_id(), None);
    }

    #[test]
    fn test_unknown_type_is_not_fatal() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"set_topic","topic":"x"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Unknown);
    }
}
