//! In-memory session store with TTL eviction.
//!
//! Gives the stateless OpenAI protocol durable-within-process multi-turn
//! memory. Sessions are keyed by an opaque id, touched on every access,
//! and reaped by a background task once `now > expires_at`. Expiration is
//! a property of the timestamp: an expired entry is invisible to every
//! read path even before the reaper gets to it.
//!
//! The map is sharded (`DashMap`), so readers of different ids never
//! contend and the reaper never holds a whole-store lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{BridgeError, Result};
use crate::openai::{self, ChatMessage};
use crate::time::iso_millis;

// ─── Session ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_accessed_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

impl Session {
    fn new(session_id: String, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Session {
            session_id,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + ttl,
            messages: Vec::new(),
            system_prompt: None,
            model: None,
            max_turns: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Optional attributes for explicit session creation (`POST /v1/sessions`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
}

/// Partial update for `PATCH /v1/sessions/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
}

/// Derived counters over the live store. Never the source of truth.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    /// Sessions removed by the most recent reaper pass.
    pub expired_sessions: usize,
    pub total_messages: usize,
    pub average_message_count: f64,
    pub cleanup_interval_minutes: f64,
    pub default_ttl_hours: f64,
}

// ─── SessionStore ─────────────────────────────────────────────────────────

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: chrono::Duration,
    cleanup_interval: std::time::Duration,
    last_reap_count: AtomicUsize,
}

impl SessionStore {
    pub fn new(ttl: std::time::Duration, cleanup_interval: std::time::Duration) -> Self {
        SessionStore {
            sessions: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
            cleanup_interval,
            last_reap_count: AtomicUsize::new(0),
        }
    }

    /// Return the session for `id`, creating an empty one if absent or
    /// expired. Touches the access time either way.
    pub fn get_or_create(&self, id: &str) -> Session {
        self.get_or_create_with(id, SessionOptions::default())
    }

    pub fn get_or_create_with(&self, id: &str, opts: SessionOptions) -> Session {
        self.get_or_create_at(id, opts, Utc::now())
    }

    fn get_or_create_at(&self, id: &str, opts: SessionOptions, now: DateTime<Utc>) -> Session {
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id.to_string(), now, self.ttl));

        // An expired entry the reaper has not yet removed is replaced, not
        // resurrected.
        if entry.is_expired(now) {
            *entry = Session::new(id.to_string(), now, self.ttl);
        }

        entry.last_accessed_at = now;
        entry.expires_at = now + self.ttl;
        if let Some(model) = opts.model {
            entry.model = Some(model);
        }
        if let Some(sp) = opts.system_prompt {
            entry.system_prompt = Some(sp);
        }
        if let Some(mt) = opts.max_turns {
            entry.max_turns = Some(mt);
        }
        entry.value().clone()
    }

    /// Return the session for `id` without creating. Touches on hit.
    pub fn get(&self, id: &str) -> Result<Session> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| BridgeError::SessionNotFound(id.to_string()))?;
        if entry.is_expired(now) {
            drop(entry);
            self.sessions.remove(id);
            return Err(BridgeError::SessionNotFound(id.to_string()));
        }
        entry.last_accessed_at = now;
        entry.expires_at = now + self.ttl;
        Ok(entry.value().clone())
    }

    /// Append messages in order, creating the session if absent. An empty
    /// slice still touches (and may create) the session.
    pub fn append(&self, id: &str, messages: Vec<ChatMessage>) -> Session {
        self.append_at(id, messages, Utc::now())
    }

    fn append_at(&self, id: &str, messages: Vec<ChatMessage>, now: DateTime<Utc>) -> Session {
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id.to_string(), now, self.ttl));
        if entry.is_expired(now) {
            *entry = Session::new(id.to_string(), now, self.ttl);
        }
        entry.last_accessed_at = now;
        entry.expires_at = now + self.ttl;
        entry.messages.extend(messages);
        entry.value().clone()
    }

    /// Apply a partial update. Touches the session.
    pub fn update(&self, id: &str, patch: SessionPatch) -> Result<Session> {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| BridgeError::SessionNotFound(id.to_string()))?;
        if entry.is_expired(now) {
            drop(entry);
            self.sessions.remove(id);
            return Err(BridgeError::SessionNotFound(id.to_string()));
        }
        entry.last_accessed_at = now;
        entry.expires_at = now + self.ttl;
        if let Some(sp) = patch.system_prompt {
            entry.system_prompt = Some(sp);
        }
        if let Some(mt) = patch.max_turns {
            entry.max_turns = Some(mt);
        }
        Ok(entry.value().clone())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        match self.sessions.remove(id) {
            Some((_, session)) if !session.is_expired(Utc::now()) => Ok(()),
            _ => Err(BridgeError::SessionNotFound(id.to_string())),
        }
    }

    /// Snapshot of non-expired sessions, in unspecified order.
    pub fn list(&self) -> Vec<Session> {
        let now = Utc::now();
        self.sessions
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        let live = self.list();
        let total_messages: usize = live.iter().map(Session::message_count).sum();
        let average = if live.is_empty() {
            0.0
        } else {
            total_messages as f64 / live.len() as f64
        };
        SessionStats {
            active_sessions: live.len(),
            expired_sessions: self.last_reap_count.load(Ordering::Relaxed),
            total_messages,
            average_message_count: average,
            cleanup_interval_minutes: self.cleanup_interval.as_secs_f64() / 60.0,
            default_ttl_hours: self.ttl.num_seconds() as f64 / 3600.0,
        }
    }

    /// The central request-path helper: with no `session_id` the call is
    /// stateless and the messages pass through unchanged; otherwise the
    /// incoming messages are appended and the full post-append history is
    /// returned along with the effective id.
    pub fn process(
        &self,
        messages: Vec<ChatMessage>,
        session_id: Option<&str>,
    ) -> (Vec<ChatMessage>, Option<String>) {
        match session_id {
            None => (messages, None),
            Some(id) => {
                let session = self.append(id, messages);
                (session.messages, Some(session.session_id))
            }
        }
    }

    /// Generate a server-side session id.
    pub fn generate_id() -> String {
        openai::session_id()
    }

    /// Remove every expired session. Returns the number removed.
    pub fn reap(&self) -> usize {
        self.reap_at(Utc::now())
    }

    fn reap_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        let removed = before.saturating_sub(self.sessions.len());
        self.last_reap_count.store(removed, Ordering::Relaxed);
        if removed > 0 {
            tracing::debug!(removed, "reaped expired sessions");
        }
        removed
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        self.cleanup_interval
    }
}

// ─── Reaper ───────────────────────────────────────────────────────────────

/// Handle to the background reaper task. Dropping it without calling
/// [`ReaperHandle::shutdown`] aborts the task on executor drop.
pub struct ReaperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic reaper for `store`. Runs until shut down; each pass
/// is idempotent and never blocks request traffic.
pub fn spawn_reaper(store: Arc<SessionStore>) -> ReaperHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let interval = store.cleanup_interval();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh store is not
        // reaped at startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    store.reap();
                }
                _ = stop_rx.changed() => {
                    tracing::debug!("session reaper stopping");
                    break;
                }
            }
        }
    });
    ReaperHandle { stop_tx, task }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(3600), Duration::from_secs(300))
    }

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::user(text)
    }

    #[test]
    fn get_or_create_initializes_timestamps() {
        let store = store();
        let session = store.get_or_create("s1");
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.created_at, session.last_accessed_at);
        assert!(session.expires_at > session.created_at);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn get_does_not_create() {
        let store = store();
        assert!(matches!(
            store.get("missing"),
            Err(BridgeError::SessionNotFound(_))
        ));
    }

    #[test]
    fn get_touches_access_time() {
        let store = store();
        let created = store.get_or_create("s1");
        let fetched = store.get("s1").unwrap();
        assert!(fetched.last_accessed_at >= created.last_accessed_at);
        assert!(fetched.expires_at >= created.expires_at);
    }

    #[test]
    fn append_preserves_order_across_writes() {
        let store = store();
        store.append("s1", vec![msg("one"), msg("two")]);
        let session = store.append("s1", vec![msg("three")]);
        let texts: Vec<_> = session
            .messages
            .iter()
            .map(|m| m.content.clone().unwrap())
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn empty_append_creates_and_touches() {
        let store = store();
        let session = store.append("s1", Vec::new());
        assert!(session.messages.is_empty());
        assert!(store.get("s1").is_ok());
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let store = store();
        store.get_or_create("s1");
        store.delete("s1").unwrap();
        assert!(store.get("s1").is_err());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let store = store();
        assert!(store.delete("nope").is_err());
    }

    #[test]
    fn process_stateless_passes_through() {
        let store = store();
        let inbound = vec![msg("hello")];
        let (out, effective) = store.process(inbound.clone(), None);
        assert_eq!(out.len(), 1);
        assert_eq!(effective, None);
        assert_eq!(store.stats().active_sessions, 0);
    }

    #[test]
    fn process_with_session_returns_full_history() {
        let store = store();
        store.append("s1", vec![msg("earlier")]);
        let (out, effective) = store.process(vec![msg("now")], Some("s1"));
        assert_eq!(effective.as_deref(), Some("s1"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content.as_deref(), Some("earlier"));
        assert_eq!(out[1].content.as_deref(), Some("now"));
    }

    #[test]
    fn expired_sessions_are_invisible_before_reap() {
        let store = SessionStore::new(Duration::from_millis(0), Duration::from_secs(300));
        let now = Utc::now();
        store.get_or_create_at("s1", SessionOptions::default(), now - chrono::Duration::seconds(10));
        assert!(store.get_at("s1", now).is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn expired_entry_is_replaced_on_recreate() {
        let store = SessionStore::new(Duration::from_secs(1), Duration::from_secs(300));
        let past = Utc::now() - chrono::Duration::hours(1);
        store.append_at("s1", vec![msg("old")], past);
        let session = store.get_or_create_at("s1", SessionOptions::default(), Utc::now());
        assert!(session.messages.is_empty(), "history must not resurrect");
    }

    #[test]
    fn reap_removes_only_expired() {
        let store = SessionStore::new(Duration::from_secs(3600), Duration::from_secs(300));
        let past = Utc::now() - chrono::Duration::hours(3);
        store.get_or_create_at("old", SessionOptions::default(), past);
        store.get_or_create("fresh");
        let removed = store.reap();
        assert_eq!(removed, 1);
        assert!(store.get("fresh").is_ok());
        assert_eq!(store.stats().expired_sessions, 1);
    }

    #[test]
    fn stats_counts_messages() {
        let store = store();
        store.append("a", vec![msg("1"), msg("2")]);
        store.append("b", vec![msg("3")]);
        let stats = store.stats();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_messages, 3);
        assert!((stats.average_message_count - 1.5).abs() < 1e-9);
        assert!((stats.default_ttl_hours - 1.0).abs() < 1e-9);
        assert!((stats.cleanup_interval_minutes - 5.0).abs() < 1e-9);
    }

    #[test]
    fn stats_repeatable_without_writes() {
        let store = store();
        store.append("a", vec![msg("1")]);
        let first = store.stats();
        let second = store.stats();
        assert_eq!(first.active_sessions, second.active_sessions);
        assert_eq!(first.total_messages, second.total_messages);
        assert_eq!(first.expired_sessions, second.expired_sessions);
    }

    #[test]
    fn options_apply_on_create_and_patch() {
        let store = store();
        store.get_or_create_with(
            "s1",
            SessionOptions {
                model: Some("claude-3-5-haiku-20241022".into()),
                system_prompt: Some("be brief".into()),
                max_turns: Some(4),
            },
        );
        let session = store
            .update(
                "s1",
                SessionPatch {
                    system_prompt: Some("be verbose".into()),
                    max_turns: None,
                },
            )
            .unwrap();
        assert_eq!(session.model.as_deref(), Some("claude-3-5-haiku-20241022"));
        assert_eq!(session.system_prompt.as_deref(), Some("be verbose"));
        assert_eq!(session.max_turns, Some(4));
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = SessionStore::generate_id();
        let b = SessionStore::generate_id();
        assert!(a.starts_with("session_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn reaper_shutdown_is_clean() {
        let store = Arc::new(SessionStore::new(
            Duration::from_secs(3600),
            Duration::from_millis(10),
        ));
        let handle = spawn_reaper(store.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn reaper_evicts_expired_sessions() {
        let store = Arc::new(SessionStore::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
        ));
        store.get_or_create("doomed");
        let handle = spawn_reaper(store.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.stats().active_sessions, 0);
        handle.shutdown().await;
    }
}
