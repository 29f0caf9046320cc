use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use bridge_core::models::ModelDescriptor;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ModelViewQuery {
    /// Include the capabilities block in each entry.
    #[serde(default)]
    pub capabilities: Option<bool>,
    /// Include the metadata block in each entry.
    #[serde(default)]
    pub metadata: Option<bool>,
}

fn model_entry(desc: &ModelDescriptor, view: &ModelViewQuery) -> Value {
    let mut entry = json!({
        "id": desc.id,
        "object": "model",
        "owned_by": "anthropic",
        "aliases": desc.aliases,
    });
    if view.capabilities.unwrap_or(false) {
        entry["capabilities"] = json!(desc.capabilities);
    }
    if view.metadata.unwrap_or(false) {
        entry["metadata"] = json!(desc.metadata);
    }
    entry
}

/// GET /v1/models — OpenAI-shaped list, optionally enriched.
pub async fn list_models(
    State(app): State<AppState>,
    Query(view): Query<ModelViewQuery>,
) -> Json<Value> {
    let data: Vec<Value> = app
        .models
        .list()
        .iter()
        .map(|desc| model_entry(desc, &view))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// GET /v1/models/{id} — aliases resolve to their canonical entry.
pub async fn get_model(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(view): Query<ModelViewQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(desc) = app.models.get(&id) else {
        return Err(ApiError::not_found(format!("model '{id}' not found"))
            .with_details(json!({ "suggestions": app.models.suggestions_for(&id) })));
    };
    Ok(Json(model_entry(desc, &view)))
}

#[derive(Debug, Deserialize)]
pub struct ValidateModelRequest {
    pub model: String,
}

/// POST /v1/models/validate — 200 for a known model, 400 with ranked
/// suggestions otherwise. Both bodies share the same validation shape.
pub async fn validate_model(
    State(app): State<AppState>,
    Json(req): Json<ValidateModelRequest>,
) -> Response {
    let started = Instant::now();
    let validation = app.models.validate(&req.model);
    let status = if validation.valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    let mut body = json!(validation);
    body["validation_time_ms"] = json!(started.elapsed().as_secs_f64() * 1000.0);
    (status, Json(body)).into_response()
}

/// GET /v1/models/{id}/capabilities.
pub async fn model_capabilities(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let Some(desc) = app.models.get(&id) else {
        return Err(ApiError::not_found(format!("model '{id}' not found"))
            .with_details(json!({ "suggestions": app.models.suggestions_for(&id) })));
    };
    Ok(Json(json!({
        "model": desc.id,
        "capabilities": desc.capabilities,
        "lookup_time_ms": started.elapsed().as_secs_f64() * 1000.0,
    })))
}
