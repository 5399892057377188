use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One event on the `POST /api/chat/stream` channel.
///
/// A stream carries zero or more [`StreamEvent::Chunk`]s followed by exactly
/// one terminal [`StreamEvent::Done`] or [`StreamEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum StreamEvent {
    /// `{"chunk": "..."}`
    Chunk { chunk: String },
    /// `{"done": true, "fullResponse": "..."}`
    Done {
        done: bool,
        #[serde(rename = "fullResponse")]
        full_response: String,
    },
    /// `{"error": "..."}`
    Error { error: String },
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { chunk: text.into() }
    }

    pub fn done(full_response: impl Into<String>) -> Self {
        Self::Done { done: true, full_response: full_response.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    pub fn to_json(&self) -> String {
        // Plain string fields only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
