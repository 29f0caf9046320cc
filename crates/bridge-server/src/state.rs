use std::path::PathBuf;
use std::sync::Arc;

use bridge_core::{Config, ModelRegistry, SessionStore};
use claude_agent::{AuthResolver, ClaudeRuntime, CliRuntime, ExecutableLocator};

use crate::metrics::Metrics;

/// Shared application state passed to all route handlers.
///
/// Constructed once at startup; every field is an `Arc` so handlers and
/// background tasks share the same store, registry, and runtime. No
/// global mutable configuration — the `Config` is immutable after
/// construction.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub models: Arc<ModelRegistry>,
    pub runtime: Arc<dyn ClaudeRuntime>,
    pub auth: Arc<AuthResolver>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Production wiring: discover the CLI, resolve provider auth, and
    /// drive the real `claude` executable.
    pub fn new(config: Config) -> Self {
        let locator = match &config.claude_command {
            Some(path) => ExecutableLocator::new(Some(PathBuf::from(path))),
            None => ExecutableLocator::from_env(),
        };
        let cli_available = locator.locate().is_some();
        let auth = Arc::new(AuthResolver::from_env(cli_available));
        let runtime = Arc::new(CliRuntime::new(locator, auth.clone()));
        Self::with_runtime(config, runtime, auth)
    }

    /// Wire an arbitrary runtime (integration tests use a scripted fake).
    pub fn with_runtime(
        config: Config,
        runtime: Arc<dyn ClaudeRuntime>,
        auth: Arc<AuthResolver>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl, config.cleanup_interval));
        AppState {
            config: Arc::new(config),
            sessions,
            models: Arc::new(ModelRegistry::new()),
            runtime,
            auth,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Minimal state for middleware-level unit tests; the runtime is the
    /// real CLI driver but nothing invokes it.
    #[cfg(test)]
    pub fn for_tests(config: Config) -> Self {
        let locator = ExecutableLocator::new(Some(PathBuf::from("/nonexistent/claude")));
        let auth = Arc::new(AuthResolver::with_state(
            claude_agent::AuthState::resolve_with(|_| None, false),
        ));
        let runtime = Arc::new(CliRuntime::new(locator, auth.clone()));
        Self::with_runtime(config, runtime, auth)
    }
}
