//! HTTP/WebSocket control surface for a [`Manager`] (§6): status, snapshot,
//! config, metrics, lifecycle commands, and a duplex `/ws/simulation`
//! socket for push updates.

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::manager::Manager;

pub use types::{ClientMessage, ServerMessage};

/// Builds the axum router, wired to a shared [`Manager`].
pub fn router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/start", post(handlers::start))
        .route("/pause", post(handlers::pause))
        .route("/resume", post(handlers::resume))
        .route("/stop", post(handlers::stop))
        .route("/reset", post(handlers::reset))
        .route("/speed", patch(handlers::patch_speed))
        .route("/step", post(handlers::step))
        .route("/config", get(handlers::get_config).put(handlers::put_config))
        .route("/config/validate", post(handlers::validate_config))
        .route("/metrics/current", get(handlers::metrics_current))
        .route("/metrics/summary", get(handlers::metrics_summary))
        .route("/ws/simulation", get(handlers::ws_simulation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

/// Binds to `addr` and serves the control API until the process exits.
///
/// # Panics
///
/// Panics if the TCP listener cannot bind to `addr`.
pub async fn serve(manager: Arc<Manager>, addr: SocketAddr) {
    let app = router(manager);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| panic!("failed to bind to {addr}: {e}"));
    tracing::info!("control API listening on http://{addr}");
    axum::serve(listener, app).await.unwrap_or_else(|e| panic!("server error: {e}"));
}
