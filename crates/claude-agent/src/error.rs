use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeAgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse stream-json line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("process error: {0}")]
    Process(String),

    #[error("claude executable not found")]
    NotFound {
        /// Human-readable hint for the operator (install command, env var).
        suggestion: String,
    },

    #[error("no usable Claude credentials: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, ClaudeAgentError>;
