//! Per-connection session protocol handler.
//!
//! One task per live socket, walking `Connecting → Active → Closing → Closed`:
//!
//! - `Connecting → Active`: authenticate the claimed identity, register in the
//!   connection registry (superseding any prior socket for the same user),
//!   flip presence online, broadcast the change to everyone else.
//! - `Active`: process `subscribe` / `unsubscribe` / `ping` control frames;
//!   unknown or malformed frames are ignored. Outbound events arrive on the
//!   session's queue and are written to the socket here, so no broadcast ever
//!   blocks on this client's backpressure.
//! - `Closing → Closed`: the cleanup steps each run best-effort and the whole
//!   sequence is guarded against double invocation.

use crate::handlers::AppState;
use crate::metrics::{self, SessionMetricsGuard};
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use weave_core::{ChannelId, Connection, UserId};
use weave_protocol::{codec, ClientFrame, Event};

struct Session {
    user_id: UserId,
    /// Registration generation of this session's connection. Cleanup and
    /// keepalive replies check it so a superseded session never touches
    /// its successor's registration.
    generation: u64,
    state: Arc<AppState>,
    closed: AtomicBool,
}

/// Drive one WebSocket session to completion.
pub async fn run(mut socket: WebSocket, user_id: UserId, state: Arc<AppState>) {
    // Connecting: resolve the claimed identity before any side effects.
    if let Err(e) = state.authenticator.authenticate(user_id).await {
        warn!(user = user_id, error = %e, "Authentication failed, closing session");
        let _ = socket.close().await;
        return;
    }

    let _metrics_guard = SessionMetricsGuard::new();

    let (conn, outbound) = Connection::open(user_id);
    let session = Session {
        user_id,
        generation: conn.generation(),
        state: Arc::clone(&state),
        closed: AtomicBool::new(false),
    };

    // Supersede any prior socket for this user. Dropping the old handle
    // closes its queue, which terminates the old session's loop.
    drop(state.registry.register(conn));

    if let Err(e) = state.presence.set_online(user_id).await {
        error!(user = user_id, error = %e, "Presence online transition failed");
    }

    match state
        .router
        .broadcast_to_all(&Event::presence_online(user_id), Some(user_id))
    {
        Ok(report) => metrics::record_broadcast("presence_change", report),
        Err(e) => error!(user = user_id, error = %e, "Online broadcast failed"),
    }

    info!(user = user_id, "Session active");

    session.serve(socket, outbound).await;
    session.close().await;
}

impl Session {
    /// Active state: pump outbound events to the socket and inbound control
    /// frames off it, until either side goes away.
    async fn serve(&self, socket: WebSocket, mut outbound: UnboundedReceiver<Arc<str>>) {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                biased;

                queued = outbound.recv() => {
                    match queued {
                        Some(payload) => {
                            if sink.send(Message::Text(payload.to_string())).await.is_err() {
                                break;
                            }
                        }
                        // Queue closed: this session was superseded.
                        None => {
                            debug!(user = self.user_id, "Connection superseded, closing session");
                            break;
                        }
                    }
                }

                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            if sink.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Binary(_))) => {
                            debug!(user = self.user_id, "Ignoring binary frame");
                            metrics::record_rejected_frame("binary");
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!(user = self.user_id, "Received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(user = self.user_id, error = %e, "WebSocket error");
                            break;
                        }
                        None => {
                            debug!(user = self.user_id, "WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one inbound text frame. Malformed or unknown frames are
    /// logged and dropped, never fatal to the session.
    async fn handle_text(&self, text: &str) {
        let frame = match codec::decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user = self.user_id, error = %e, "Ignoring malformed frame");
                metrics::record_rejected_frame("malformed");
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe { channel_id } => self.subscribe(channel_id).await,
            ClientFrame::Unsubscribe { channel_id } => {
                self.state.index.unsubscribe(self.user_id, channel_id);
            }
            ClientFrame::Ping => self.keepalive().await,
            ClientFrame::Unknown => {
                debug!(user = self.user_id, "Ignoring unknown frame type");
                metrics::record_rejected_frame("unknown");
            }
        }
    }

    /// Validate persisted membership, then mirror it into the channel index.
    async fn subscribe(&self, channel_id: ChannelId) {
        let members = match self.state.directory.list_members(channel_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(user = self.user_id, channel = channel_id, error = %e, "Subscribe rejected");
                metrics::record_rejected_frame("membership");
                return;
            }
        };

        match self.state.index.subscribe(self.user_id, channel_id, &members) {
            Ok(()) => metrics::record_subscription(),
            Err(e) => {
                warn!(user = self.user_id, channel = channel_id, error = %e, "Subscribe rejected");
                metrics::record_rejected_frame("membership");
            }
        }
    }

    /// Refresh presence and answer with a pong event.
    async fn keepalive(&self) {
        if let Err(e) = self.state.presence.touch(self.user_id).await {
            warn!(user = self.user_id, error = %e, "Presence touch failed");
        }

        // Reply through the registry so a superseded session cannot answer
        // on its successor's behalf.
        if let Some(conn) = self.state.registry.lookup(self.user_id) {
            if conn.generation() == self.generation {
                match codec::encode_event(&Event::Pong) {
                    Ok(text) => {
                        let _ = conn.send(Arc::from(text));
                    }
                    Err(e) => error!(user = self.user_id, error = %e, "Pong encode failed"),
                }
            }
        }
    }

    /// Closing → Closed. Each step runs even if an earlier one fails, and the
    /// whole sequence runs at most once per session, so racing socket-error
    /// and explicit-close paths cannot double-broadcast.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let user = self.user_id;
        let owned = self.state.registry.deregister_if(user, self.generation);

        // Superseded while still active: the successor session now owns the
        // user's registration, subscriptions, and presence.
        if !owned && self.state.registry.is_connected(user) {
            debug!(user, "Closed superseded session, state belongs to successor");
            return;
        }

        self.state.index.drop_user(user);

        if let Err(e) = self.state.presence.set_offline(user).await {
            error!(user, error = %e, "Presence offline transition failed");
        }

        match self
            .state
            .router
            .broadcast_to_all(&Event::presence_offline(user, Utc::now()), Some(user))
        {
            Ok(report) => metrics::record_broadcast("presence_change", report),
            Err(e) => error!(user, error = %e, "Offline broadcast failed"),
        }

        info!(user, "Session closed");
    }
}
