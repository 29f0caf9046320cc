//! `claude-agent` — native Rust driver for the Claude CLI subprocess.
//!
//! Implements the `--output-format stream-json` protocol as a first-class
//! Rust library so the gateway can call Claude without a Node.js runtime.
//!
//! # Architecture
//!
//! ```text
//! ExecutableLocator  ← finds `claude` once (env override → well-known → PATH)
//!     │
//! AuthResolver       ← picks a provider, builds the env overlay
//!     │
//!     ▼
//! ClaudeProcess      ← spawns `claude --print --output-format stream-json …`
//!     │                 reads JSONL from stdout
//!     ▼
//! EventStream        ← implements futures::Stream<Item = Result<RuntimeEvent>>
//!     │                 background task + mpsc channel; drop = cancel
//!     ▼
//! RuntimeEvent enum  ← fully typed; no Value escape hatches on the hot path
//! ```
//!
//! The [`ClaudeRuntime`] trait is the seam the HTTP layer talks through;
//! tests swap in a deterministic fake built on [`EventStream::channel`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub mod auth;
pub mod discovery;
pub mod error;
pub mod types;

pub(crate) mod process;
pub mod stream;

pub use auth::{AuthMethod, AuthResolver, AuthState};
pub use discovery::ExecutableLocator;
pub use error::ClaudeAgentError;
pub use stream::EventStream;
pub use types::{
    AssistantContent, AssistantEvent, CompletionOptions, ContentBlock, ResultEvent, ResultSuccess,
    ResultUsage, RuntimeEvent, SystemEvent, SystemInit, SystemPayload,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeAgentError>;

// ─── VerifyReport ─────────────────────────────────────────────────────────

/// Outcome of probing for a working Claude runtime.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub authentication: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

// ─── ClaudeRuntime trait ──────────────────────────────────────────────────

/// The runtime interface the completion service drives.
///
/// Production uses [`CliRuntime`]; tests use a scripted fake pushing
/// events through [`EventStream::channel`].
#[async_trait]
pub trait ClaudeRuntime: Send + Sync {
    /// Probe for a usable executable and auth path. Cheap after the first
    /// success.
    async fn verify(&self) -> VerifyReport;

    /// Start one completion. The returned stream yields events lazily;
    /// dropping it cancels the invocation and kills the child.
    async fn run_completion(&self, prompt: String, opts: CompletionOptions) -> Result<EventStream>;
}

// ─── CliRuntime ───────────────────────────────────────────────────────────

/// Drives the real `claude` CLI. One value per process; each
/// `run_completion` spawns its own child, the discovered path is shared
/// read-only.
pub struct CliRuntime {
    locator: ExecutableLocator,
    auth: Arc<AuthResolver>,
    verified: tokio::sync::RwLock<Option<VerifyReport>>,
}

impl CliRuntime {
    pub fn new(locator: ExecutableLocator, auth: Arc<AuthResolver>) -> Self {
        CliRuntime {
            locator,
            auth,
            verified: tokio::sync::RwLock::new(None),
        }
    }

    async fn probe_version(&self, executable: &std::path::Path) -> Result<String> {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            tokio::process::Command::new(executable)
                .arg("--version")
                .output(),
        )
        .await
        .map_err(|_| ClaudeAgentError::Process("claude --version timed out".into()))?
        .map_err(ClaudeAgentError::Io)?;

        if !output.status.success() {
            return Err(ClaudeAgentError::Process(format!(
                "claude --version exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ClaudeRuntime for CliRuntime {
    async fn verify(&self) -> VerifyReport {
        if let Some(report) = self.verified.read().await.as_ref() {
            if report.available {
                return report.clone();
            }
        }

        let auth_state = self.auth.state();
        let Some(executable) = self.locator.locate() else {
            return VerifyReport {
                available: false,
                version: None,
                authentication: auth_state.method,
                error: Some("claude executable not found".into()),
                suggestion: Some(ExecutableLocator::install_suggestion().into()),
            };
        };
        let executable = executable.to_path_buf();

        let report = match self.probe_version(&executable).await {
            Ok(version) => VerifyReport {
                available: true,
                version: Some(version),
                authentication: auth_state.method,
                error: None,
                suggestion: if auth_state.authenticated {
                    None
                } else {
                    Some("set ANTHROPIC_API_KEY or run `claude login`".into())
                },
            },
            Err(e) => VerifyReport {
                available: false,
                version: None,
                authentication: auth_state.method,
                error: Some(e.to_string()),
                suggestion: Some(ExecutableLocator::install_suggestion().into()),
            },
        };

        if report.available {
            *self.verified.write().await = Some(report.clone());
        }
        report
    }

    async fn run_completion(
        &self,
        prompt: String,
        mut opts: CompletionOptions,
    ) -> Result<EventStream> {
        let Some(executable) = self.locator.locate() else {
            return Err(ClaudeAgentError::NotFound {
                suggestion: ExecutableLocator::install_suggestion().into(),
            });
        };

        // Auth overlay first; request-specific entries win on conflict.
        let mut env = self.auth.overlay();
        env.extend(opts.env.drain());
        opts.env = env;

        Ok(EventStream::spawn(
            executable.to_path_buf(),
            prompt,
            opts,
        ))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unauthenticated_resolver() -> Arc<AuthResolver> {
        Arc::new(AuthResolver::with_state(AuthState::resolve_with(
            |_| None,
            false,
        )))
    }

    #[tokio::test]
    async fn verify_reports_missing_executable() {
        let locator = ExecutableLocator::new(Some(PathBuf::from("/nonexistent/claude")));
        // Force the locator to miss PATH too by probing a name that can
        // only resolve through discovery; if a real claude is installed
        // on PATH this test still exercises the report shape.
        let runtime = CliRuntime::new(locator, unauthenticated_resolver());
        let report = runtime.verify().await;
        if !report.available {
            assert!(report.suggestion.is_some());
            assert!(report.error.is_some());
        }
    }

    #[tokio::test]
    async fn run_completion_without_executable_is_typed_not_found() {
        // An empty PATH plus a bad override guarantees a miss.
        let locator = ExecutableLocator::new(Some(PathBuf::from("/nonexistent/claude")));
        let runtime = CliRuntime::new(locator, unauthenticated_resolver());
        if runtime.locator.locate().is_none() {
            let err = runtime
                .run_completion("hi".into(), CompletionOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ClaudeAgentError::NotFound { .. }));
        }
    }
}
