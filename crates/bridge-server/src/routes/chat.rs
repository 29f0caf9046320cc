use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use bridge_core::openai::ChatCompletionRequest;

use crate::completion;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /v1/chat/completions — the OpenAI-compatible entry point.
///
/// Branches on the request's `stream` flag: `false` returns one JSON
/// body, `true` returns SSE frames terminated by `data: [DONE]`.
pub async fn chat_completions(
    State(app): State<AppState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    tracing::info!(
        model = %req.model,
        stream = req.stream,
        session = req.session_id.as_deref().unwrap_or("-"),
        messages = req.messages.len(),
        "chat completion"
    );

    if req.stream {
        completion::complete_stream(app, req)
            .await
            .map(IntoResponse::into_response)
    } else {
        completion::complete(&app, req)
            .await
            .map(|resp| Json(resp).into_response())
    }
}
