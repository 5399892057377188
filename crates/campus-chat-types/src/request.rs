//! Request / response bodies of the `/api/chat` routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::message::{ChatMessage, HistoryTurn};

/// Upper bound on a single user message, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 128 * 1024; // 128 KiB

/// Body of `POST /api/chat` and `POST /api/chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation key; unseen keys start a new conversation.
    #[validate(length(min = 1, message = "sessionId must be a non-empty string"))]
    pub session_id: String,
    /// The visitor's new message.
    #[validate(
        length(min = 1, message = "message must be a non-empty string"),
        custom(function = "validate_message_size")
    )]
    pub message: String,
    /// Prior turns the caller wants the model to see, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<HistoryTurn>>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            conversation_history: None,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.conversation_history = Some(history);
        self
    }

    /// The turns submitted to the model: the caller's history followed by
    /// the new user message.
    pub fn turns(&self) -> Vec<HistoryTurn> {
        let mut turns = self.conversation_history.clone().unwrap_or_default();
        turns.push(HistoryTurn::user(self.message.clone()));
        turns
    }
}

fn validate_message_size(message: &str) -> Result<(), ValidationError> {
    if message.len() > MAX_MESSAGE_BYTES {
        let mut err = ValidationError::new("too_large");
        err.message = Some("message exceeds the 128 KiB limit".into());
        return Err(err);
    }
    Ok(())
}

/// Response of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// The stored assistant turn.
    pub message: ChatMessage,
    /// The raw reply text (same as `message.content`).
    pub response: String,
}

/// Response of `GET /api/chat/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

/// Response of `DELETE /api/chat/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClearResponse {
    pub success: bool,
}

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}
