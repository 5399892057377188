//! OpenAI chat-completions client.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use campus_chat_types::{HistoryTurn, SseStep, sse_items};
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    CompletionClient, EMPTY_REPLY_FALLBACK, FragmentStream, ProviderError, SYSTEM_PROMPT,
};
use crate::config::Config;

/// Client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Build a client from server configuration.
    ///
    /// Fails with [`ProviderError::MissingApiKey`] when no credential is set.
    pub fn from_config(cfg: &Config) -> Result<Self, ProviderError> {
        let api_key = cfg.openai_api_key.clone().ok_or(ProviderError::MissingApiKey)?;

        let mut builder =
            Client::builder().user_agent(concat!("campus-chat-server/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = cfg.provider_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_key,
            base_url: cfg.openai_base_url.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            client: builder.build()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body<'a>(&'a self, history: &'a [HistoryTurn], stream: bool) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage { role: "system", content: SYSTEM_PROMPT });
        messages.extend(history.iter().map(|turn| WireMessage {
            role: turn.role.as_ref(),
            content: &turn.content,
        }));
        CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn post(&self, body: &CompletionRequest<'_>) -> Result<Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, history: &[HistoryTurn]) -> Result<String, ProviderError> {
        debug!(model = %self.model, turns = history.len(), "requesting completion");
        let response = self.post(&self.request_body(history, false)).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty());

        Ok(content.unwrap_or_else(|| {
            warn!(model = %self.model, "provider returned an empty reply; using fallback text");
            EMPTY_REPLY_FALLBACK.to_owned()
        }))
    }

    async fn stream(&self, history: &[HistoryTurn]) -> Result<FragmentStream, ProviderError> {
        debug!(model = %self.model, turns = history.len(), "requesting streaming completion");
        let response = self.post(&self.request_body(history, true)).await?;
        Ok(fragments(response.bytes_stream()))
    }
}

/// Turn a streaming-completion body into reply fragments.
///
/// Role-only and empty deltas are skipped; `data: [DONE]` or the end of the
/// body finishes the stream.
pub(crate) fn fragments<S>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    sse_items(bytes, fragment_step).boxed()
}

fn fragment_step(data: &str) -> SseStep<String, ProviderError> {
    if data.trim() == "[DONE]" {
        return SseStep::End;
    }
    match serde_json::from_str::<ChunkResponse>(data) {
        Ok(ChunkResponse { error: Some(err), .. }) => SseStep::Fail(ProviderError::Upstream(err.message)),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map_or(SseStep::Skip, SseStep::Item),
        Err(e) => SseStep::Fail(ProviderError::Decode(e.to_string())),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ── Tests ──────────────────────────────────────────────────────────────────────
