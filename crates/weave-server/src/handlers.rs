//! HTTP surface and shared server state.
//!
//! The WebSocket endpoint hands sockets to the session handler; the presence
//! read endpoints are plain request/response backed by the presence store.

use crate::config::{Config, PresenceBackend};
use crate::{metrics, session};
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use weave_core::{
    Authenticator, BroadcastRouter, ChannelIndex, ConnectionRegistry, Directory, MemoryPresence,
    PresenceStore, RedisPresence, UserId,
};

/// Shared server state.
///
/// All fabric state is explicitly constructed here and passed by handle;
/// nothing is process-global.
pub struct AppState {
    /// Live connections, one per user.
    pub registry: Arc<ConnectionRegistry>,
    /// Channel ↔ subscriber index.
    pub index: Arc<ChannelIndex>,
    /// Presence backend, selected at startup.
    pub presence: Arc<dyn PresenceStore>,
    /// Event fan-out router.
    pub router: BroadcastRouter,
    /// Persisted channel membership collaborator.
    pub directory: Arc<dyn Directory>,
    /// Identity verification collaborator.
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create server state, connecting the configured presence backend.
    ///
    /// A failed Redis connection falls back to the in-memory store rather
    /// than refusing to start.
    pub async fn new(
        config: &Config,
        directory: Arc<dyn Directory>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let presence: Arc<dyn PresenceStore> = match config.presence.backend {
            PresenceBackend::Memory => Arc::new(MemoryPresence::new()),
            PresenceBackend::Redis => match RedisPresence::connect(&config.presence.redis_url).await
            {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!("Redis connection failed: {e}. Using in-memory presence.");
                    Arc::new(MemoryPresence::new())
                }
            },
        };

        let registry = Arc::new(ConnectionRegistry::new());
        let index = Arc::new(ChannelIndex::new());
        let router = BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&index));

        Self {
            registry,
            index,
            presence,
            router,
            directory,
            authenticator,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(
    config: Config,
    directory: Arc<dyn Directory>,
    authenticator: Arc<dyn Authenticator>,
) -> Result<()> {
    let state = Arc::new(AppState::new(&config, directory, authenticator).await);

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app_router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Weave server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws/{{user_id}}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the axum router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/:user_id", get(ws_handler))
        .route("/presence/:user_id", get(presence_handler))
        .route("/presence/online", get(online_users_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<UserId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run(socket, user_id, state))
}

/// Read one user's presence.
async fn presence_handler(
    Path(user_id): Path<UserId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let record = state.presence.get(user_id).await.map_err(|e| {
        error!(user = user_id, error = %e, "Presence read failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(serde_json::json!({
        "user_id": record.user_id,
        "online": record.online,
        "last_seen": record.last_seen,
    })))
}

/// List currently online user IDs.
async fn online_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let users = state.presence.list_online().await.map_err(|e| {
        error!(error = %e, "Online-set read failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(users))
}
