use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use bridge_core::openai::ChatMessage;
use bridge_core::session::{SessionOptions, SessionPatch};
use bridge_core::SessionStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Client-chosen id; generated server-side when omitted.
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
}

/// POST /v1/sessions — create an explicit session.
pub async fn create_session(
    State(app): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(model) = &req.model {
        if !app.models.contains(model) {
            return Err(ApiError::unknown_model(
                model,
                app.models.suggestions_for(model),
                app.models
                    .available_ids()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ));
        }
    }

    let id = req.session_id.unwrap_or_else(SessionStore::generate_id);
    let session = app.sessions.get_or_create_with(
        &id,
        SessionOptions {
            model: req.model,
            system_prompt: req.system_prompt,
            max_turns: req.max_turns,
        },
    );
    Ok((StatusCode::CREATED, Json(json!(session))))
}

/// GET /v1/sessions — snapshot of live sessions.
pub async fn list_sessions(State(app): State<AppState>) -> Json<Value> {
    let sessions = app.sessions.list();
    Json(json!({
        "sessions": sessions,
        "total": sessions.len(),
    }))
}

/// GET /v1/sessions/stats — derived counters.
pub async fn session_stats(State(app): State<AppState>) -> Json<Value> {
    Json(json!(app.sessions.stats()))
}

/// GET /v1/sessions/{id} — 404 once expired or deleted.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = app.sessions.get(&id)?;
    Ok(Json(json!(session)))
}

/// PATCH /v1/sessions/{id} — partial update of prompt/turn settings.
pub async fn update_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<Value>, ApiError> {
    let session = app.sessions.update(&id, patch)?;
    Ok(Json(json!(session)))
}

/// DELETE /v1/sessions/{id}.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    app.sessions.delete(&id)?;
    Ok(Json(json!({
        "message": format!("Session {id} deleted successfully")
    })))
}

#[derive(Debug, Deserialize)]
pub struct AppendMessagesRequest {
    pub messages: Vec<ChatMessage>,
}

/// POST /v1/sessions/{id}/messages — append turns; creates the session
/// if absent. An empty array is legal and still touches the session.
pub async fn append_messages(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessagesRequest>,
) -> Json<Value> {
    let session = app.sessions.append(&id, req.messages);
    Json(json!({
        "session_id": session.session_id,
        "message_count": session.message_count(),
        "messages": session.messages,
    }))
}
