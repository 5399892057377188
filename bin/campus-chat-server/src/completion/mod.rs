//! Completion client: the seam between the relay routes and the hosted
//! language-model provider.
//!
//! Routes only see [`CompletionClient`]; the production implementation is
//! [`openai::OpenAiClient`]. Every implementation prepends
//! [`SYSTEM_PROMPT`] to the caller's turns and never retries.

mod knowledge;
pub mod openai;
#[cfg(test)]
pub mod scripted;

use std::fmt;

use async_trait::async_trait;
use campus_chat_types::HistoryTurn;
use futures::stream::BoxStream;
use thiserror::Error;

pub use knowledge::{EMPTY_REPLY_FALLBACK, SYSTEM_PROMPT};
pub use openai::OpenAiClient;

/// Reply fragments in arrival order. An `Err` item ends the stream; the
/// fragments yielded before it stand.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Failures of the upstream completion call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No credential was configured.
    #[error("provider API key is not set; export OPENAI_API_KEY")]
    MissingApiKey,

    /// Transport-level failure (DNS, connect, TLS, reset, timeout).
    #[error("request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status (auth, quota, ...).
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider's body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Decode(String),

    /// The provider reported an error inside an already-open stream.
    #[error("provider reported an error: {0}")]
    Upstream(String),
}

/// Hosted chat-completion API.
#[async_trait]
pub trait CompletionClient: Send + Sync + fmt::Debug {
    /// Full reply to `history` (oldest turn first), as one string.
    async fn complete(&self, history: &[HistoryTurn]) -> Result<String, ProviderError>;

    /// Reply to `history` delivered incrementally. The concatenation of all
    /// `Ok` items is the full reply.
    async fn stream(&self, history: &[HistoryTurn]) -> Result<FragmentStream, ProviderError>;
}
