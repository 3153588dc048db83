//! Flashback collector server library.

pub mod api;
pub mod config;
pub mod retention;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use flashback_db::DbPool;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Maximum request body size (4 MiB). A full-page snapshot batch can be
/// large; anything beyond this is rejected to protect against OOM.
const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
///
/// CORS is permissive: the capture snippet posts batches from whatever
/// origin embeds it.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/collect", post(api::collect_handler))
        .route("/api/sessions", get(api::list_sessions_handler))
        .route(
            "/api/sessions/{sessionId}",
            get(api::get_session_handler).delete(api::delete_session_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
