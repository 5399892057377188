//! Canned [`CompletionClient`] used by the route tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use campus_chat_types::HistoryTurn;
use futures::stream::{self, StreamExt};
use tokio::sync::Notify;

use super::{CompletionClient, FragmentStream, ProviderError};

/// What the next call answers with.
#[derive(Debug)]
pub enum Script {
    /// Succeed; streaming yields each part as one fragment.
    Reply(Vec<&'static str>),
    /// Fail before any fragment is produced.
    FailBeforeStart,
    /// Yield the parts, then fail.
    FailAfter(Vec<&'static str>),
    /// Like `Reply`, but the stream holds its first fragment until notified.
    Gated(Vec<&'static str>, Arc<Notify>),
}

/// Pops one [`Script`] per call and records every history it was given.
/// With no script queued it replies `"Welcome to DTEC."`.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    seen: Mutex<Vec<Vec<HistoryTurn>>>,
}

impl ScriptedCompletion {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            seen: Mutex::default(),
        }
    }

    /// Histories passed to the client, one per call.
    pub fn seen(&self) -> Vec<Vec<HistoryTurn>> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self, history: &[HistoryTurn]) -> Script {
        self.seen.lock().unwrap().push(history.to_vec());
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Reply(vec!["Welcome to DTEC."]))
    }
}

fn scripted_failure() -> ProviderError {
    ProviderError::Status { status: 503, body: "scripted failure".into() }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, history: &[HistoryTurn]) -> Result<String, ProviderError> {
        match self.next(history) {
            Script::Reply(parts) | Script::Gated(parts, _) => Ok(parts.concat()),
            Script::FailBeforeStart | Script::FailAfter(_) => Err(scripted_failure()),
        }
    }

    async fn stream(&self, history: &[HistoryTurn]) -> Result<FragmentStream, ProviderError> {
        let fragments = |parts: Vec<&'static str>| stream::iter(parts.into_iter().map(|p| Ok(p.to_owned())));
        match self.next(history) {
            Script::Reply(parts) => Ok(fragments(parts).boxed()),
            Script::FailBeforeStart => Err(scripted_failure()),
            Script::FailAfter(parts) => Ok(fragments(parts)
                .chain(stream::once(async { Err(ProviderError::Upstream("scripted failure".into())) }))
                .boxed()),
            Script::Gated(parts, gate) => Ok(stream::once(async move { gate.notified().await })
                .flat_map(move |()| fragments(parts.clone()))
                .boxed()),
        }
    }
}
