//! Visitor-side chat session: local transcript plus the Idle/Awaiting
//! state machine.
//!
//! A session allows one reply in flight at a time. The transcript always
//! starts with a seeded assistant greeting that is shown to the visitor but
//! never sent to the relay as history.

use std::sync::{Mutex, MutexGuard, PoisonError};

use campus_chat_types::{ChatRequest, HistoryTurn, Role, StreamEvent};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::relay::RelayClient;

/// Id of the seeded greeting entry.
pub const WELCOME_ID: &str = "welcome";
/// Text of the seeded greeting entry.
pub const WELCOME_TEXT: &str = "How can I assist you today?";

/// One line of the local transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    fn welcome() -> Self {
        Self {
            id: WELCOME_ID.to_owned(),
            role: Role::Assistant,
            content: WELCOME_TEXT.to_owned(),
            timestamp: Utc::now(),
        }
    }
}

/// Transient message for the visitor, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into() }
    }

    fn error(description: impl Into<String>) -> Self {
        Self::new("Error", description)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    /// A reply is in flight; further sends fail with [`ClientError::Busy`].
    Awaiting,
}

#[derive(Debug)]
struct Inner {
    transcript: Vec<TranscriptEntry>,
    state: SessionState,
    notice: Option<Notice>,
    next_id: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            transcript: vec![TranscriptEntry::welcome()],
            state: SessionState::Idle,
            notice: None,
            next_id: 1,
        }
    }

    fn push(&mut self, role: Role, content: &str) -> String {
        let id = format!("local-{}", self.next_id);
        self.next_id += 1;
        self.transcript.push(TranscriptEntry {
            id: id.clone(),
            role,
            content: content.to_owned(),
            timestamp: Utc::now(),
        });
        id
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut TranscriptEntry> {
        self.transcript.iter_mut().find(|e| e.id == id)
    }

    /// Turns sent as `conversationHistory`: everything except the greeting.
    fn history(&self) -> Vec<HistoryTurn> {
        self.transcript
            .iter()
            .filter(|e| e.id != WELCOME_ID)
            .map(|e| HistoryTurn { role: e.role, content: e.content.clone() })
            .collect()
    }

    fn reset(&mut self) {
        self.transcript = vec![TranscriptEntry::welcome()];
    }
}

/// A visitor's conversation with the relay.
#[derive(Debug)]
pub struct ChatSession {
    relay: RelayClient,
    session_id: String,
    inner: Mutex<Inner>,
}

impl ChatSession {
    pub fn new(relay: RelayClient, session_id: impl Into<String>) -> Self {
        Self {
            relay,
            session_id: session_id.into(),
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Session keyed `session-<unix millis>`.
    pub fn with_generated_id(relay: RelayClient) -> Self {
        Self::new(relay, format!("session-{}", Utc::now().timestamp_millis()))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.lock().transcript.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// The pending notice, if any. Each notice is returned once.
    pub fn take_notice(&self) -> Option<Notice> {
        self.lock().notice.take()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `text` and stream the reply into the transcript, calling
    /// `on_chunk` with each fragment as it arrives. Returns the full reply.
    pub async fn send_streaming<F>(&self, text: &str, mut on_chunk: F) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        let (req, flight) = self.begin(text)?;
        let result = self.stream_reply(&req, &flight, &mut on_chunk).await;
        flight.finish(result)
    }

    /// Send `text` and wait for the whole reply.
    pub async fn send(&self, text: &str) -> Result<String, ClientError> {
        let (req, flight) = self.begin(text)?;
        let result = self.relay.send(&req).await.map(|resp| resp.response);
        flight.finish(result)
    }

    /// Reset the transcript to the greeting, then clear the relay's copy.
    ///
    /// The local reset stands even when the relay call fails.
    pub async fn clear(&self) -> Result<(), ClientError> {
        self.lock().reset();
        let result = self.relay.clear(&self.session_id).await;
        let notice = match &result {
            Ok(()) => Notice::new("Chat Cleared", "Your conversation has been reset."),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "failed to clear chat");
                Notice::error("Failed to clear chat. Please try again.")
            }
        };
        self.lock().notice = Some(notice);
        result
    }

    /// Idle → Awaiting: record the user turn and an empty reply placeholder.
    fn begin(&self, text: &str) -> Result<(ChatRequest, InFlight<'_>), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let mut inner = self.lock();
        if inner.state == SessionState::Awaiting {
            return Err(ClientError::Busy);
        }
        // Taken before the new turn: the relay appends it itself.
        let history = inner.history();
        inner.push(Role::User, text);
        let reply_id = inner.push(Role::Assistant, "");
        inner.state = SessionState::Awaiting;
        inner.notice = None;
        drop(inner);

        debug!(session_id = %self.session_id, turns = history.len(), "sending message");
        let req = ChatRequest::new(self.session_id.clone(), text).with_history(history);
        Ok((req, InFlight { session: self, reply_id, completed: false }))
    }

    async fn stream_reply<F>(
        &self,
        req: &ChatRequest,
        flight: &InFlight<'_>,
        on_chunk: &mut F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        let mut events = self.relay.send_stream(req).await?;
        let mut full = String::new();
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Chunk { chunk } => {
                    full.push_str(&chunk);
                    flight.set_reply(&full);
                    on_chunk(&chunk);
                }
                StreamEvent::Done { full_response, .. } => return Ok(full_response),
                StreamEvent::Error { error } => return Err(ClientError::Stream(error)),
            }
        }
        Err(ClientError::Incomplete)
    }
}

/// The reply currently being produced. Dropping it returns the session to
/// Idle, also when the send future itself is dropped; an unfinished reply
/// with no content is removed from the transcript.
struct InFlight<'a> {
    session: &'a ChatSession,
    reply_id: String,
    completed: bool,
}

impl InFlight<'_> {
    fn set_reply(&self, content: &str) {
        if let Some(entry) = self.session.lock().entry_mut(&self.reply_id) {
            entry.content = content.to_owned();
        }
    }

    fn finish(mut self, result: Result<String, ClientError>) -> Result<String, ClientError> {
        match &result {
            Ok(reply) => {
                self.set_reply(reply);
                self.completed = true;
            }
            Err(e) => {
                warn!(session_id = %self.session.session_id, error = %e, "send failed");
                self.session.lock().notice = Some(Notice::error(e.notice_text()));
            }
        }
        result
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.session.lock();
        inner.state = SessionState::Idle;
        if !self.completed {
            inner
                .transcript
                .retain(|e| e.id != self.reply_id || !e.content.is_empty());
        }
    }
}
