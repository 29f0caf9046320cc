use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ─── ExecutableLocator ────────────────────────────────────────────────────

/// Finds the Claude executable once and caches the answer for the process
/// lifetime.
///
/// Resolution order: explicit override (`CLAUDE_COMMAND` /
/// `CLAUDE_CLI_PATH`) → well-known per-user and system install paths →
/// `PATH` search. After the first probe no filesystem access happens
/// again; construct a fresh locator to re-probe (test fixtures do).
pub struct ExecutableLocator {
    override_path: Option<PathBuf>,
    cached: OnceLock<Option<PathBuf>>,
}

impl ExecutableLocator {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        ExecutableLocator {
            override_path,
            cached: OnceLock::new(),
        }
    }

    /// Build a locator from the process environment.
    pub fn from_env() -> Self {
        let override_path = std::env::var("CLAUDE_COMMAND")
            .or_else(|_| std::env::var("CLAUDE_CLI_PATH"))
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::new(override_path)
    }

    /// The resolved executable path, if any. Probes at most once.
    pub fn locate(&self) -> Option<&Path> {
        self.cached.get_or_init(|| self.probe()).as_deref()
    }

    fn probe(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.override_path {
            if explicit.is_file() {
                tracing::debug!(path = %explicit.display(), "using claude executable override");
                return Some(explicit.clone());
            }
            tracing::warn!(
                path = %explicit.display(),
                "claude executable override does not exist, falling back to discovery"
            );
        }

        for candidate in well_known_paths() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "found claude at well-known path");
                return Some(candidate);
            }
        }

        match which::which("claude") {
            Ok(found) => {
                tracing::debug!(path = %found.display(), "found claude on PATH");
                Some(found)
            }
            Err(_) => None,
        }
    }

    /// Operator-facing hint shown when discovery fails.
    pub fn install_suggestion() -> &'static str {
        "install the Claude CLI (npm install -g @anthropic-ai/claude-code) \
         or point CLAUDE_CLI_PATH at an existing binary"
    }
}

fn well_known_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = home::home_dir() {
        paths.push(home.join(".claude/local/claude"));
        paths.push(home.join(".local/bin/claude"));
        paths.push(home.join(".npm-global/bin/claude"));
    }
    paths.push(PathBuf::from("/usr/local/bin/claude"));
    paths.push(PathBuf::from("/opt/homebrew/bin/claude"));
    paths
}

// ─── Tests ────────────────────────────────────────────────────────────────
