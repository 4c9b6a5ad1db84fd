//! JSON codec for frames and events.
//!
//! One frame or event per WebSocket text message; no length-prefixing or
//! partial-frame buffering is needed.

use crate::{ClientFrame, Event};
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize an event.
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to parse an inbound frame.
    #[error("Failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize an event to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &Event) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Parse an inbound control frame from JSON text.
///
/// Frames with an unrecognized `"type"` decode to [`ClientFrame::Unknown`];
/// only malformed JSON or missing fields produce an error.
///
/// # Errors
///
/// Returns an error if the text is not a valid frame object.
pub fn decode_frame(text: &str) -> Result<ClientFrame, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame() {
        let frame = decode_frame(r#"{"type":"unsubscribe","channel_id":9}"#).unwrap();
        assert_eq!(frame, ClientFrame::unsubscribe(9));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"channel_id":9}"#).is_err());
    }

    #[test]
    fn test_encode_event() {
        let text = encode_event(&Event::Pong).unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);
    }
}
