use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use bridge_core::error::BridgeError;
use bridge_core::openai;
use claude_agent::ClaudeAgentError;

// ---------------------------------------------------------------------------
// ApiError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
///
/// Every error body leaving the gateway comes out of this one formatter:
/// `{"error": {"type", "message", "code", "request_id", "details"?}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(
        status: StatusCode,
        error_type: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ApiError {
            status,
            error_type,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 422 with field-level detail; classification category rides along
    /// for clients that key off it.
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        let mut details = json!({
            "classification": { "category": "validation_error" }
        });
        if let Some(field) = &field {
            details["field"] = json!(field);
        }
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "invalid_request",
            message,
        )
        .with_details(details)
    }

    /// 400 with ranked suggestions and the full model list.
    pub fn unknown_model(model: &str, suggestions: Vec<String>, available: Vec<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "model_error",
            "model_not_supported",
            format!("model '{model}' is not supported"),
        )
        .with_details(json!({
            "suggestions": suggestions,
            "available_models": available,
        }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found_error",
            "not_found",
            message,
        )
    }

    /// 401 for a missing or mismatched wrapper bearer.
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "invalid_api_key",
            "missing or invalid bearer token",
        )
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream_failed",
            message,
        )
    }

    /// 502 for upstream (Claude-side) auth failures, distinguished from
    /// the wrapper 401 by its `code`.
    pub fn upstream_auth(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "authentication_error",
            "upstream_auth_failed",
            message,
        )
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout_error",
            "request_timeout",
            format!("request exceeded its {seconds}s deadline"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal_error",
            message,
        )
    }

    /// The wire body, also used for mid-stream error frames.
    pub fn body(&self) -> Value {
        let mut error = json!({
            "type": self.error_type,
            "message": self.message,
            "code": self.code,
            "request_id": openai::request_id(),
        });
        if let Some(details) = &self.details {
            error["details"] = details.clone();
        }
        json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = %self.code, "{}", self.message);
        }
        (self.status, axum::Json(self.body())).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Validation { message, field } => Self::validation(message, field),
            BridgeError::UnknownModel { model, suggestions } => {
                Self::unknown_model(&model, suggestions, Vec::new())
            }
            BridgeError::SessionNotFound(id) => Self::not_found(format!("session '{id}' not found")),
            BridgeError::UpstreamAuth(msg) => Self::upstream_auth(msg),
            BridgeError::Upstream(msg) => Self::upstream(msg),
            BridgeError::Timeout(secs) => Self::timeout(secs),
            BridgeError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl From<ClaudeAgentError> for ApiError {
    fn from(err: ClaudeAgentError) -> Self {
        match err {
            ClaudeAgentError::NotFound { suggestion } => {
                Self::upstream("claude executable not found")
                    .with_details(json!({ "suggestion": suggestion }))
            }
            ClaudeAgentError::Auth(msg) => Self::upstream_auth(msg),
            ClaudeAgentError::Io(e) => Self::upstream(format!("claude runtime I/O failure: {e}")),
            ClaudeAgentError::Parse { .. } => {
                Self::upstream("claude runtime emitted an unreadable event stream")
            }
            ClaudeAgentError::Process(msg) => Self::upstream(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
