use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use claude_agent::AuthMethod;

use crate::state::AppState;

/// GET /v1/auth/status — wrapper protection plus the resolved Claude
/// provider picture. Reachable without the wrapper bearer so clients can
/// discover that one is required.
pub async fn auth_status(State(app): State<AppState>) -> Json<Value> {
    let auth = app.auth.state();
    let api_key_required = app.config.api_key.is_some();

    Json(json!({
        "server_info": {
            "api_key_required": api_key_required,
            "auth_method": if api_key_required { "bearer" } else { "none" },
            "provider": auth.method.as_str(),
        },
        "claude_auth": {
            "configured": auth.method != AuthMethod::None,
            "anthropic_api_key_configured": auth.anthropic_configured,
            "bedrock_configured": auth.bedrock_configured,
            "vertex_configured": auth.vertex_configured,
            "claude_cli_available": auth.cli_available,
            "errors": auth.errors,
        },
    }))
}
