use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Author of a chat turn.
///
/// Only the two conversational roles exist on the wire; the provider's
/// system instruction is added server-side and can never be supplied by a
/// caller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One stored turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Opaque identifier assigned at creation.
    pub id: String,
    /// Caller-chosen conversation key.
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Assigned by the store; never decreases within a session.
    pub timestamp: DateTime<Utc>,
    /// Set on an assistant turn whose streamed reply failed part-way.
    /// `content` then holds whatever arrived before the failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub interrupted: bool,
}

/// A prior turn supplied by the caller in `conversationHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}
