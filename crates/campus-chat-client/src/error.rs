use thiserror::Error;

/// Errors surfaced by [`crate::RelayClient`] and [`crate::ChatSession`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to the relay.
    #[error("request to chat relay failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("chat relay returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The relay reported a failure inside an open reply stream.
    #[error("{0}")]
    Stream(String),

    /// A relay body did not have the expected shape.
    #[error("malformed relay response: {0}")]
    Decode(String),

    /// A reply is still in flight for this session.
    #[error("a reply is already in progress")]
    Busy,

    /// The message was empty or whitespace only.
    #[error("message is empty")]
    EmptyMessage,

    /// The reply stream closed without a terminal event.
    #[error("reply stream ended before completion")]
    Incomplete,

    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Text suitable for a visitor-facing notice.
    pub fn notice_text(&self) -> String {
        match self {
            ClientError::Stream(message) | ClientError::Status { message, .. } => message.clone(),
            ClientError::Busy => "Please wait for the current reply to finish.".to_owned(),
            _ => "Failed to send message. Please try again.".to_owned(),
        }
    }
}
