pub mod completion;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bridge_core::Config;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Chat completions (streaming and not)
        .route(
            "/v1/chat/completions",
            post(routes::chat::chat_completions),
        )
        // Sessions
        .route(
            "/v1/sessions",
            post(routes::sessions::create_session).get(routes::sessions::list_sessions),
        )
        .route("/v1/sessions/stats", get(routes::sessions::session_stats))
        .route("/v1/sessions/{id}", get(routes::sessions::get_session))
        .route("/v1/sessions/{id}", patch(routes::sessions::update_session))
        .route(
            "/v1/sessions/{id}",
            delete(routes::sessions::delete_session),
        )
        .route(
            "/v1/sessions/{id}/messages",
            post(routes::sessions::append_messages),
        )
        // Models
        .route("/v1/models", get(routes::models::list_models))
        .route("/v1/models/validate", post(routes::models::validate_model))
        .route("/v1/models/{id}", get(routes::models::get_model))
        .route(
            "/v1/models/{id}/capabilities",
            get(routes::models::model_capabilities),
        )
        // Auth and health
        .route("/v1/auth/status", get(routes::auth::auth_status))
        .route("/v1/metrics", get(routes::health::metrics))
        .route("/health", get(routes::health::health))
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Outermost: unauthorized requests are rejected before anything
        // else sees them.
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            guard::require_api_key,
        ))
        .with_state(app_state)
}

/// Start the gateway on the configured port.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(config, listener).await
}

/// Start the gateway on a pre-bound listener.
///
/// Accepting a `TcpListener` lets callers bind port 0 and read the real
/// port before starting. Ties the session reaper's lifetime to the
/// server: the reaper starts before the listener accepts and is shut
/// down after the listener stops on SIGINT/SIGTERM.
pub async fn serve_on(config: Config, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    tracing::info!("claude-bridge listening on http://localhost:{actual_port}");
    if config.api_key.is_some() {
        tracing::info!("API key protection is enabled");
    }

    let app_state = state::AppState::new(config);
    let reaper = bridge_core::spawn_reaper(app_state.sessions.clone());
    let app = build_router(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.shutdown().await;
    tracing::info!("claude-bridge stopped");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
