//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    audit::{self, AuditLog},
    callback::{self, RelayDispatcher},
    config::Config,
    connections::ConnectionStore,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Tenant connection lookup
    pub connections: Arc<dyn ConnectionStore>,
    /// Audit writer and live log broadcaster
    pub audit: AuditLog,
    /// Outbound relay client
    pub relay: RelayDispatcher,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        audit: AuditLog,
        relay: RelayDispatcher,
        config: Config,
    ) -> Self {
        Self {
            connections,
            audit,
            relay,
            config: Arc::new(config),
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_body_size = state.config.max_body_size;

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Platform callbacks; the second path is the legacy deployment URL
        .nest("/callback", callback::router())
        .nest("/api/weixin/callback", callback::router())
        // Live audit log
        .route("/api/ws", get(audit::ws::handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_size))
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
