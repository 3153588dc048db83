//! Collector API handlers.
//!
//! - `POST /api/collect` — append one event batch
//! - `GET /api/sessions` — paginated session list, most recent first
//! - `GET /api/sessions/{sessionId}` — full session with ordered events
//! - `DELETE /api/sessions/{sessionId}` — remove a session and its events
//!
//! The client network address used for visitor fingerprinting is read
//! from `X-Forwarded-For` (first hop), the header any fronting proxy
//! sets; absent the header, the fingerprint simply omits the address.

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use flashback_store::{
    append_events, delete_session, get_session, list_sessions, SessionPage, StoreError,
};
use flashback_types::{CollectResponse, EventBatch};

/// Largest page the session list returns.
const MAX_LIST_LIMIT: i64 = 100;

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn internal_error(message: String) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn client_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = forwarded.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// Handler for `POST /api/collect`.
///
/// Validation failures reject the whole batch with a 400; storage
/// failures roll back fully and surface as a 500. A re-delivered batch
/// whose earlier attempt committed is appended again — at-least-once
/// delivery is resolved in favor of duplicates, not loss.
pub async fn collect_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<EventBatch>, JsonRejection>,
) -> Result<Json<CollectResponse>, Response> {
    let Json(batch) = payload.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("malformed batch: {e}"))
    })?;

    if batch.session_id.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "missing sessionId".to_string(),
        ));
    }
    if batch.events.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "batch contains no events".to_string(),
        ));
    }

    let address = client_address(&headers);
    let pool = state.pool.clone();

    let appended = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        append_events(&mut conn, &batch, address.as_deref()).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(internal_error)?;

    Ok(Json(CollectResponse {
        success: true,
        events_received: appended as u64,
    }))
}

/// Query parameters for `GET /api/sessions`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Page size (default 20, max 100).
    pub limit: Option<i64>,
    /// Page offset (default 0).
    pub offset: Option<i64>,
}

/// Handler for `GET /api/sessions`.
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<SessionPage>, Response> {
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);
    let pool = state.pool.clone();

    let page = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        list_sessions(&conn, limit, offset).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(internal_error)?;

    Ok(Json(page))
}

/// Handler for `GET /api/sessions/{sessionId}`.
///
/// Returns the session row plus its ordered event log, with each stored
/// payload parsed back into the original event object.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, Response> {
    let pool = state.pool.clone();

    let detail = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| StoreError::Database(
            rusqlite_pool_error(&e.to_string()),
        ))?;
        get_session(&conn, &session_id)
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(store_error_response)?;

    let mut events = Vec::with_capacity(detail.events.len());
    for row in &detail.events {
        let event: Value = serde_json::from_str(&row.payload_json)
            .map_err(|e| internal_error(format!("corrupt stored event: {e}")))?;
        events.push(event);
    }

    Ok(Json(json!({
        "session": detail.session,
        "events": events,
    })))
}

/// Handler for `DELETE /api/sessions/{sessionId}`.
pub async fn delete_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, Response> {
    let pool = state.pool.clone();

    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| StoreError::Database(
            rusqlite_pool_error(&e.to_string()),
        ))?;
        delete_session(&conn, &session_id)
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(store_error_response)?;

    Ok(Json(json!({ "success": true })))
}

/// Maps store errors onto API responses: absent sessions are 404s,
/// everything else is a 500.
fn store_error_response(error: StoreError) -> Response {
    match error {
        StoreError::SessionNotFound(id) => error_response(
            StatusCode::NOT_FOUND,
            format!("session not found: {id}"),
        ),
        other => internal_error(other.to_string()),
    }
}

/// Wraps a pool checkout failure in a rusqlite error so the store error
/// path treats it as a real database failure.
fn rusqlite_pool_error(message: &str) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some(format!("pool connection error: {message}")),
    )
}
