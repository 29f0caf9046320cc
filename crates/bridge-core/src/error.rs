use thiserror::Error;

/// Closed error taxonomy for the gateway core.
///
/// Every user-visible failure maps to exactly one variant; the HTTP layer
/// derives the status code, wire `type`, and stable `code` from here so all
/// error bodies come out of one formatter.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Client-fixable request problem (bad field, orphan tool message, …).
    #[error("{message}")]
    Validation {
        message: String,
        /// The offending field, when one can be named.
        field: Option<String>,
    },

    /// The requested model is not in the registry.
    #[error("unknown model: {model}")]
    UnknownModel {
        model: String,
        suggestions: Vec<String>,
    },

    /// Session id was not found (or had expired).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The Claude backend rejected our credentials or has none.
    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// The Claude runtime failed mid-call (spawn, parse, non-zero exit).
    #[error("claude runtime error: {0}")]
    Upstream(String),

    /// The request exceeded its configured deadline.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Anything unclassified. Surfaced without internal detail.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        BridgeError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Wire-level `error.type` for this variant.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Validation { .. } => "validation_error",
            BridgeError::UnknownModel { .. } => "model_error",
            BridgeError::SessionNotFound(_) => "not_found_error",
            BridgeError::UpstreamAuth(_) => "authentication_error",
            BridgeError::Upstream(_) => "upstream_error",
            BridgeError::Timeout(_) => "timeout_error",
            BridgeError::Internal(_) => "internal_error",
        }
    }

    /// Stable machine-readable `error.code` for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Validation { .. } => "invalid_request",
            BridgeError::UnknownModel { .. } => "model_not_supported",
            BridgeError::SessionNotFound(_) => "session_not_found",
            BridgeError::UpstreamAuth(_) => "upstream_auth_failed",
            BridgeError::Upstream(_) => "upstream_failed",
            BridgeError::Timeout(_) => "request_timeout",
            BridgeError::Internal(_) => "internal_error",
        }
    }
}

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
