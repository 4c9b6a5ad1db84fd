//! # weave-protocol
//!
//! Wire protocol definitions for the Weave messaging fabric.
//!
//! The protocol is JSON text over a persistent bidirectional stream:
//!
//! - **Client frames** - control frames sent by clients (`subscribe`,
//!   `unsubscribe`, `ping`)
//! - **Events** - server-pushed notifications (`new_message`, `read_receipt`,
//!   `presence_change`)
//!
//! Every frame and event carries a `"type"` discriminator field.

pub mod codec;
pub mod events;
pub mod frames;

/// Opaque user identity, owned by the user-management collaborator.
pub type UserId = i64;

/// Opaque channel identity, owned by the persistence collaborator.
pub type ChannelId = i64;

pub use codec::ProtocolError;
pub use events::{ChatMessage, Event};
pub use frames::ClientFrame;
