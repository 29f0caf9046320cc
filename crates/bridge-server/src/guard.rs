use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Routes reachable without the wrapper bearer, so operators can probe
/// liveness and discover that a key is required at all.
const EXEMPT_PATHS: &[&str] = &["/health", "/v1/auth/status"];

/// Axum middleware gating the HTTP surface behind the wrapper bearer.
///
/// A no-op when no `API_KEY` is configured. Header name matching is
/// case-insensitive (axum normalizes); the token comparison is
/// byte-exact.
pub async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = app.config.api_key.as_deref() else {
        return next.run(req).await;
    };

    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token.as_bytes() == expected.as_bytes() => next.run(req).await,
        _ => ApiError::unauthorized().into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use tower::ServiceExt;

    use bridge_core::Config;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_app(api_key: Option<&str>) -> Router {
        let config = Config {
            api_key: api_key.map(String::from),
            ..Config::default()
        };
        let state = AppState::for_tests(config);
        Router::new()
            .route("/health", get(ok_handler))
            .route("/v1/auth/status", get(ok_handler))
            .route("/v1/sessions", get(ok_handler))
            .layer(middleware::from_fn_with_state(state, require_api_key))
    }

    async fn status_for(app: Router, uri: &str, auth: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn no_key_configured_passes_everything() {
        assert_eq!(
            status_for(test_app(None), "/v1/sessions", None).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn missing_header_is_401() {
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/sessions", None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn wrong_token_is_401() {
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/sessions", Some("Bearer wrong")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn token_comparison_is_byte_exact() {
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/sessions", Some("Bearer K")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn matching_token_passes() {
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/sessions", Some("Bearer k")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn health_and_auth_status_are_exempt() {
        assert_eq!(
            status_for(test_app(Some("k")), "/health", None).await,
            StatusCode::OK
        );
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/auth/status", None).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_401() {
        assert_eq!(
            status_for(test_app(Some("k")), "/v1/sessions", Some("Basic azprYQ==")).await,
            StatusCode::UNAUTHORIZED
        );
    }
}
