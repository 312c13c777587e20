//! HTTP server for the mesh bridge
//!
//! Thin routing and serialization over [`meshttpd_bridge::MeshBridge`];
//! all behavior lives in the bridge crate.

pub mod messages;
pub mod rest;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Index and health check
        .route("/", get(rest::index))
        .route("/health", get(rest::health))
        // Mesh API
        .route("/api/mesh/send_message", post(rest::send_message))
        .route("/api/mesh/get_device_telemetry", get(rest::get_device_telemetry))
        .route(
            "/api/mesh/get_environment_telemetry",
            get(rest::get_environment_telemetry),
        )
        .route("/api/mesh/get_last_messages", get(rest::get_last_messages))
        .route("/api/mesh/nodes", get(rest::nodes))
        .route("/api/mesh/status", get(rest::status))
        // CORS for dashboards and local tooling
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
