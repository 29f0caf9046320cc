use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use bridge_core::time::format_iso_millis;

use crate::state::AppState;

/// GET /health — liveness plus a small identity block.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "claude-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": app.metrics.uptime_seconds(),
        "timestamp": format_iso_millis(chrono::Utc::now()),
    }))
}

/// GET /v1/metrics — counters for the monitoring surface.
pub async fn metrics(State(app): State<AppState>) -> Json<Value> {
    Json(json!(app.metrics.snapshot()))
}
