//! `bridge-core` — protocol types and state for the claude-bridge gateway.
//!
//! Everything here is HTTP-free: the OpenAI wire format, the
//! OpenAI↔Claude message adapter, the TTL session store with its reaper,
//! the static model registry, process configuration, and the closed error
//! taxonomy. `bridge-server` composes these behind axum routes.

pub mod adapter;
pub mod config;
pub mod error;
pub mod models;
pub mod openai;
pub mod session;
pub mod time;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use models::ModelRegistry;
pub use session::{spawn_reaper, ReaperHandle, Session, SessionStats, SessionStore};
