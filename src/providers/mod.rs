//! Provider contract: the uniform interface the dispatcher uses to invoke
//! external capabilities (market data, knowledge lookup, holdings analysis,
//! notification delivery, news search).
//!
//! Providers know nothing about routing, caching, or one another. They return
//! a tagged outcome by value so the dispatcher and aggregator branch on an
//! explicit tag instead of inspecting error text.

pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use registry::{ProviderConfig, ProviderRegistry};

/// Closed set of provider identities, fixed before any request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Market,
    Knowledge,
    Holdings,
    Notify,
    News,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::Market,
        ProviderId::Knowledge,
        ProviderId::Holdings,
        ProviderId::Notify,
        ProviderId::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Market => "market",
            ProviderId::Knowledge => "knowledge",
            ProviderId::Holdings => "holdings",
            ProviderId::Notify => "notify",
            ProviderId::News => "news",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-defined payload: free text, a structured record, or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProviderContent {
    Text(String),
    Record(JsonValue),
    List(Vec<JsonValue>),
}

impl ProviderContent {
    /// Flattens the content to plain text for fingerprinting and for the
    /// summarizer's structured context.
    pub fn as_text(&self) -> String {
        match self {
            ProviderContent::Text(text) => text.clone(),
            ProviderContent::Record(value) => value.to_string(),
            ProviderContent::List(items) => items
                .iter()
                .map(|item| match item {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A source the provider attributes its content to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub label: String,
    pub score: f32,
}

impl SourceAttribution {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Usable content returned by a provider, with its attributions and the raw
/// payload kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub content: ProviderContent,
    pub sources: Vec<SourceAttribution>,
    pub raw: Option<JsonValue>,
}

impl ProviderPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: ProviderContent::Text(content.into()),
            sources: Vec::new(),
            raw: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceAttribution>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_raw(mut self, raw: JsonValue) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Outcome of a provider invocation. `Empty` means the provider legitimately
/// found nothing; it is not an error and is excluded from aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderOutcome {
    Content(ProviderPayload),
    Empty,
}

/// An error raised by a provider invocation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("provider call failed: {0}")]
    CallFailed(String),
    #[error("upstream service unavailable: {0}")]
    Unavailable(String),
}

/// A capability invoked uniformly by the dispatcher.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The identity this provider serves.
    fn id(&self) -> ProviderId;

    /// Executes the provider against the query.
    async fn invoke(&self, query: &str) -> Result<ProviderOutcome, ProviderError>;
}

/// Adapter that runs a blocking provider implementation on the worker pool.
///
/// The adaptation happens once at registration, not per call: providers with
/// a native async implementation implement [`Provider`] directly, blocking
/// ones are wrapped here.
pub struct BlockingProvider<F> {
    id: ProviderId,
    call: Arc<F>,
}

impl<F> BlockingProvider<F>
where
    F: Fn(&str) -> Result<ProviderOutcome, ProviderError> + Send + Sync + 'static,
{
    pub fn new(id: ProviderId, call: F) -> Self {
        Self {
            id,
            call: Arc::new(call),
        }
    }
}

#[async_trait]
impl<F> Provider for BlockingProvider<F>
where
    F: Fn(&str) -> Result<ProviderOutcome, ProviderError> + Send + Sync + 'static,
{
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(&self, query: &str) -> Result<ProviderOutcome, ProviderError> {
        let call = Arc::clone(&self.call);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || call(&query))
            .await
            .map_err(|e| ProviderError::CallFailed(format!("worker task failed: {e}")))?
    }
}
