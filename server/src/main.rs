//! WeCom Callback Relay Server - Main Entry Point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use wx_relay_server::{
    api,
    audit::{AuditLog, LogBroadcaster, PgAuditSink},
    callback::RelayDispatcher,
    config, db,
    connections::PgConnectionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wx_relay_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting WeCom callback relay"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    let audit = AuditLog::new(
        Arc::new(PgAuditSink::new(db_pool.clone())),
        LogBroadcaster::new(),
    );
    let relay = RelayDispatcher::new(
        config.relay_timeout(),
        config.relay_block_private_addresses,
    )?;
    info!(
        timeout_secs = config.relay_timeout_secs,
        block_private = config.relay_block_private_addresses,
        "Relay dispatcher initialized"
    );

    // Build application state
    let state = api::AppState::new(
        Arc::new(PgConnectionStore::new(db_pool)),
        audit,
        relay,
        config.clone(),
    );

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// Resolves on CTRL+C. If the handler cannot be installed the server runs until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, cleaning up...");
}
