//! HTTP router
//!
//! Health, a conversation lookup, and the media-stream WebSocket route.
//! Admin surfaces (agent CRUD, webhook management) live outside this
//! service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::state::AppState;
use crate::websocket::media_stream;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/conversations/:call_id", get(get_conversation))
        .route("/media-stream", get(media_stream))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": state.sessions.len(),
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let record = state
        .deps
        .store
        .get(&call_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(json!({
        "conversation_id": record.call_id,
        "agent_id": record.agent_id,
        "status": record.status.as_str(),
        "transcript": record.transcript,
        "phone_number": record.phone_number,
        "started_at": record.started_at.to_rfc3339(),
        "ended_at": record.ended_at.map(|t| t.to_rfc3339()),
    })))
}
