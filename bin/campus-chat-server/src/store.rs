//! In-memory, session-keyed chat transcript store.
//!
//! Holds every [`ChatMessage`] written by the relay routes for the lifetime
//! of the process. Each method takes the lock once, so single operations are
//! atomic; nothing spans several calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use campus_chat_types::{ChatMessage, Role};
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Messages of one session plus the time of its last write.
#[derive(Debug)]
struct SessionLog {
    /// Insertion order, which is also ascending timestamp order.
    messages: Vec<ChatMessage>,
    last_write: Instant,
}

/// Process-wide chat transcript store, shared through [`crate::state::AppState`].
#[derive(Debug, Default)]
pub struct MessageStore {
    sessions: RwLock<HashMap<String, SessionLog>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to `session_id`, creating the session if unseen.
    pub async fn create(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> ChatMessage {
        self.insert(session_id, role, content.into(), false).await
    }

    /// Append an assistant turn whose streamed reply failed part-way.
    pub async fn create_interrupted(
        &self,
        session_id: &str,
        partial: impl Into<String>,
    ) -> ChatMessage {
        self.insert(session_id, Role::Assistant, partial.into(), true).await
    }

    async fn insert(
        &self,
        session_id: &str,
        role: Role,
        content: String,
        interrupted: bool,
    ) -> ChatMessage {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| SessionLog { messages: Vec::new(), last_write: Instant::now() });

        // Wall clocks can step backwards; clamp so a session never does.
        let now = Utc::now();
        let timestamp = match log.messages.last() {
            Some(prev) if prev.timestamp > now => prev.timestamp,
            _ => now,
        };

        let msg = ChatMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            role,
            content,
            timestamp,
            interrupted,
        };
        log.messages.push(msg.clone());
        log.last_write = Instant::now();
        msg
    }

    /// All messages of `session_id` in ascending timestamp order; empty for
    /// an unknown session.
    pub async fn list(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Remove every message of `session_id`. Returns how many were removed;
    /// clearing an unknown session removes nothing and is not an error.
    pub async fn clear(&self, session_id: &str) -> usize {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|log| log.messages.len())
            .unwrap_or(0)
    }

    /// Drop every session whose last write is older than `ttl`. Returns the
    /// number of sessions removed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, log| {
            let keep = log.last_write.elapsed() <= ttl;
            if !keep {
                debug!(session_id = %session_id, messages = log.messages.len(), "evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Number of sessions currently held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Periodically evict sessions idle for longer than `ttl`.
pub fn spawn_sweeper(store: Arc<MessageStore>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(ttl).await;
            if evicted > 0 {
                let remaining = store.session_count().await;
                info!(evicted, remaining, "idle sessions evicted");
            }
        }
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
