//! Claude provider auth resolution.
//!
//! Determines which backend path is usable and builds the environment
//! overlay the subprocess needs. Selection order is fixed:
//! Anthropic API key → AWS Bedrock → Google Vertex → Claude CLI login.
//! Resolution only inspects the environment (and executable discovery);
//! it never contacts a network.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

// ─── AuthMethod ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthMethod {
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "bedrock")]
    Bedrock,
    #[serde(rename = "vertex")]
    Vertex,
    #[serde(rename = "claude-cli")]
    ClaudeCli,
    #[serde(rename = "none")]
    None,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Anthropic => "anthropic",
            AuthMethod::Bedrock => "bedrock",
            AuthMethod::Vertex => "vertex",
            AuthMethod::ClaudeCli => "claude-cli",
            AuthMethod::None => "none",
        }
    }
}

// ─── AuthState ────────────────────────────────────────────────────────────

/// The resolved provider picture for this process.
#[derive(Debug, Clone, Serialize)]
pub struct AuthState {
    pub method: AuthMethod,
    pub authenticated: bool,
    pub anthropic_configured: bool,
    pub bedrock_configured: bool,
    pub vertex_configured: bool,
    pub cli_available: bool,
    /// Why earlier providers in the selection order were skipped.
    pub errors: Vec<String>,
    /// Environment variables to merge over the process environment when
    /// invoking the Claude runtime.
    #[serde(skip)]
    pub env_overlay: HashMap<String, String>,
}

impl AuthState {
    /// Resolve from an arbitrary key lookup. `cli_available` comes from
    /// executable discovery so this function stays filesystem-free.
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>, cli_available: bool) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let truthy =
            |key: &str| matches!(get(key).as_deref(), Some("1") | Some("true") | Some("yes"));

        let mut errors = Vec::new();
        let mut overlay = HashMap::new();

        // Anthropic direct.
        let anthropic_key = get("ANTHROPIC_API_KEY");
        let anthropic_configured = anthropic_key.is_some();

        // Bedrock: opt-in flag plus some AWS credential source.
        let bedrock_flag = truthy("CLAUDE_CODE_USE_BEDROCK");
        let aws_creds = get("AWS_ACCESS_KEY_ID").is_some()
            || get("AWS_PROFILE").is_some()
            || get("AWS_REGION").is_some();
        let bedrock_configured = bedrock_flag && aws_creds;
        if bedrock_flag && !aws_creds {
            errors.push(
                "CLAUDE_CODE_USE_BEDROCK is set but no AWS credentials were found".to_string(),
            );
        }

        // Vertex: opt-in flag plus service-account credentials.
        let vertex_flag = truthy("CLAUDE_CODE_USE_VERTEX");
        let vertex_creds = get("GOOGLE_APPLICATION_CREDENTIALS").is_some();
        let vertex_configured = vertex_flag && vertex_creds;
        if vertex_flag && !vertex_creds {
            errors.push(
                "CLAUDE_CODE_USE_VERTEX is set but GOOGLE_APPLICATION_CREDENTIALS is not"
                    .to_string(),
            );
        }

        let method = if let Some(key) = anthropic_key {
            overlay.insert("ANTHROPIC_API_KEY".to_string(), key);
            AuthMethod::Anthropic
        } else if bedrock_configured {
            errors.push("ANTHROPIC_API_KEY not set".to_string());
            overlay.insert("CLAUDE_CODE_USE_BEDROCK".to_string(), "1".to_string());
            for key in [
                "AWS_REGION",
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_SESSION_TOKEN",
                "AWS_PROFILE",
            ] {
                if let Some(value) = get(key) {
                    overlay.insert(key.to_string(), value);
                }
            }
            AuthMethod::Bedrock
        } else if vertex_configured {
            errors.push("ANTHROPIC_API_KEY not set".to_string());
            overlay.insert("CLAUDE_CODE_USE_VERTEX".to_string(), "1".to_string());
            for key in [
                "GOOGLE_APPLICATION_CREDENTIALS",
                "ANTHROPIC_VERTEX_PROJECT_ID",
                "CLOUD_ML_REGION",
            ] {
                if let Some(value) = get(key) {
                    overlay.insert(key.to_string(), value);
                }
            }
            AuthMethod::Vertex
        } else if cli_available {
            errors.push("no provider credentials in the environment".to_string());
            // The CLI carries its own login state; nothing to overlay.
            AuthMethod::ClaudeCli
        } else {
            errors.push("no provider credentials and no claude executable".to_string());
            AuthMethod::None
        };

        AuthState {
            method,
            authenticated: method != AuthMethod::None,
            anthropic_configured,
            bedrock_configured,
            vertex_configured,
            cli_available,
            errors,
            env_overlay: overlay,
        }
    }

    fn resolve_from_env(cli_available: bool) -> Self {
        Self::resolve_with(|key| std::env::var(key).ok(), cli_available)
    }
}

// ─── AuthResolver ─────────────────────────────────────────────────────────

/// Process-scoped holder for the resolved [`AuthState`], with explicit
/// refresh. Constructed once at startup and shared by reference.
pub struct AuthResolver {
    state: RwLock<AuthState>,
}

impl AuthResolver {
    pub fn from_env(cli_available: bool) -> Self {
        let state = AuthState::resolve_from_env(cli_available);
        tracing::info!(method = state.method.as_str(), "resolved Claude auth");
        AuthResolver {
            state: RwLock::new(state),
        }
    }

    pub fn with_state(state: AuthState) -> Self {
        AuthResolver {
            state: RwLock::new(state),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.read().expect("auth state lock poisoned").clone()
    }

    pub fn overlay(&self) -> HashMap<String, String> {
        self.state
            .read()
            .expect("auth state lock poisoned")
            .env_overlay
            .clone()
    }

    /// Re-read the environment. Used when the operator rotates keys
    /// without restarting the process.
    pub fn refresh(&self, cli_available: bool) -> AuthState {
        let fresh = AuthState::resolve_from_env(cli_available);
        let mut guard = self.state.write().expect("auth state lock poisoned");
        *guard = fresh.clone();
        fresh
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
