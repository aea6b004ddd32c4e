//! Barter Marketplace Backend Server
//!
//! REST API and websocket notifications for a peer-to-peer barter
//! marketplace: trade listings, valuation, conversations between traders.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use barter_backend::auth::{IdentityVerifier, JwtIdentityVerifier};
use barter_backend::config::Config;
use barter_backend::db;
use barter_backend::routes::create_router;
use barter_backend::state::AppState;
use barter_backend::store::{MemoryStore, PgStore, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting barter backend");

    let store: Arc<dyn Repository> = match config.database_url {
        Some(_) => Arc::new(PgStore::new(db::connect(&config).await?)),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let identity: Arc<dyn IdentityVerifier> = Arc::new(
        JwtIdentityVerifier::from_config(&config.identity)
            .context("Failed to initialise identity verification")?,
    );

    let app_state = AppState::new(&config, store, identity);
    let app = create_router(app_state, config.cors_allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
