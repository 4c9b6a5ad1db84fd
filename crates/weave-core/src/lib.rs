//! # weave-core
//!
//! Connection tracking, channel fan-out, presence and broadcast routing for
//! the Weave messaging fabric.
//!
//! This crate is the only concurrency-sensitive part of the system:
//!
//! - **ConnectionRegistry** - at most one live socket per user
//! - **ChannelIndex** - bidirectional channel ↔ subscriber mapping
//! - **PresenceStore** - online/offline state with TTL expiry (Redis) or a
//!   process-local fallback
//! - **BroadcastRouter** - best-effort event fan-out with originator exclusion
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Session    │────▶│   Registry   │◀────│    Router    │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        │                                         │
//!        ▼                                         ▼
//! ┌──────────────┐                          ┌──────────────┐
//! │   Presence   │                          │ ChannelIndex │
//! └──────────────┘                          └──────────────┘
//! ```
//!
//! Everything here is explicitly constructed and passed by handle; there are
//! no implicit globals. Internal locks guard map mutation only, never I/O.

pub mod collab;
pub mod index;
pub mod presence;
pub mod registry;
pub mod router;

pub use weave_protocol::{ChannelId, UserId};

pub use collab::{AuthError, Authenticator, Directory, DirectoryError, StaticDirectory};
pub use index::{ChannelIndex, MembershipError};
pub use presence::{MemoryPresence, PresenceError, PresenceRecord, PresenceStore, RedisPresence};
pub use registry::{Connection, ConnectionRegistry, DeliveryError};
pub use router::{BroadcastRouter, DeliveryReport};
