//! # Weave Server
//!
//! Realtime messaging fabric server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (Redis presence, memory fallback)
//! weave
//!
//! # Run with environment variables
//! WEAVE_PORT=8080 WEAVE_PRESENCE=memory weave
//! ```
//!
//! The standalone binary backs the directory and authenticator collaborators
//! with a static roster seeded from the `[directory]` config section; an
//! embedding application provides real implementations instead.

mod config;
mod handlers;
mod ingest;
mod metrics;
mod session;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weave_core::StaticDirectory;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weave=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Weave server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Seed the static directory/authenticator for standalone operation
    let directory = Arc::new(StaticDirectory::new());
    for user in &config.directory.users {
        directory.add_user(*user);
    }
    for seed in &config.directory.channels {
        directory.add_channel(seed.id, seed.members.iter().copied());
    }

    // Start the server
    handlers::run_server(config, directory.clone(), directory).await?;

    Ok(())
}
