//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::store::MessageStore;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Session transcripts.
    pub store: Arc<MessageStore>,
    /// Upstream language-model provider.
    pub completion: Arc<dyn CompletionClient>,
}

#[cfg(test)]
impl AppState {
    /// State around a scripted provider, for route tests.
    pub fn for_tests(completion: Arc<crate::completion::scripted::ScriptedCompletion>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(Config::default()),
            store: Arc::new(MessageStore::new()),
            completion,
        })
    }
}
