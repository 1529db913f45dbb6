//! Shared mocks for unit and integration tests.
//!
//! Compiled unconditionally so the integration suite under `tests/` can use
//! them through the public crate root.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::AppError;
use crate::orchestrator::Orchestrator;
use crate::providers::{
    Provider, ProviderError, ProviderId, ProviderOutcome, ProviderPayload, SourceAttribution,
};
use crate::summarizer::Summarizer;

/// Shared event log for asserting call ordering across providers. Entries
/// are `"{provider}:start"` and `"{provider}:end"`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

enum MockResponse {
    Text(String),
    Payload(ProviderPayload),
    Empty,
    Error(String),
}

/// Scripted provider. Each invocation returns the same outcome; call count,
/// optional latency, and an optional shared log support ordering and
/// caching assertions.
pub struct MockProvider {
    id: ProviderId,
    response: MockResponse,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    log: Option<CallLog>,
}

impl MockProvider {
    pub fn text(id: ProviderId, text: &str) -> Self {
        Self::with_response(id, MockResponse::Text(text.to_string()))
    }

    pub fn payload(id: ProviderId, payload: ProviderPayload) -> Self {
        Self::with_response(id, MockResponse::Payload(payload))
    }

    pub fn empty(id: ProviderId) -> Self {
        Self::with_response(id, MockResponse::Empty)
    }

    pub fn failing(id: ProviderId, message: &str) -> Self {
        Self::with_response(id, MockResponse::Error(message.to_string()))
    }

    fn with_response(id: ProviderId, response: MockResponse) -> Self {
        Self {
            id,
            response,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Counter handle that survives moving the mock into the orchestrator.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn record(&self, phase: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{}:{phase}", self.id));
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(&self, _query: &str) -> Result<ProviderOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record("end");

        match &self.response {
            MockResponse::Text(text) => Ok(ProviderOutcome::Content(
                ProviderPayload::text(text.clone())
                    .with_sources(vec![SourceAttribution::new(self.id.as_str(), 0.9)]),
            )),
            MockResponse::Payload(payload) => Ok(ProviderOutcome::Content(payload.clone())),
            MockResponse::Empty => Ok(ProviderOutcome::Empty),
            MockResponse::Error(message) => Err(ProviderError::CallFailed(message.clone())),
        }
    }
}

enum MockSynthesis {
    Fixed(String),
    EchoContext,
    Fail,
}

/// Deterministic summarizer stand-in.
pub struct MockSummarizer {
    synthesis: MockSynthesis,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockSummarizer {
    pub fn fixed(response: &str) -> Self {
        Self::with_synthesis(MockSynthesis::Fixed(response.to_string()))
    }

    /// Returns the structured context verbatim, so tests can assert that
    /// provider content flows through to the final response.
    pub fn echo_context() -> Self {
        Self::with_synthesis(MockSynthesis::EchoContext)
    }

    pub fn failing() -> Self {
        Self::with_synthesis(MockSynthesis::Fail)
    }

    fn with_synthesis(synthesis: MockSynthesis) -> Self {
        Self {
            synthesis,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn synthesize(
        &self,
        _query: &str,
        structured_context: &str,
        _language: &str,
        _style: &str,
    ) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.synthesis {
            MockSynthesis::Fixed(response) => Ok(response.clone()),
            MockSynthesis::EchoContext => Ok(structured_context.to_string()),
            MockSynthesis::Fail => Err(AppError::SummarizerError(
                "mock summarizer configured to fail".to_string(),
            )),
        }
    }
}

/// Builds a fully wired orchestrator over mock providers with default
/// configuration.
pub fn orchestrator_with(
    providers: Vec<MockProvider>,
    summarizer: MockSummarizer,
) -> Orchestrator {
    orchestrator_with_config(Config::default(), providers, summarizer)
}

pub fn orchestrator_with_config(
    config: Config,
    providers: Vec<MockProvider>,
    summarizer: MockSummarizer,
) -> Orchestrator {
    let map: HashMap<ProviderId, Arc<dyn Provider>> = providers
        .into_iter()
        .map(|p| (p.id, Arc::new(p) as Arc<dyn Provider>))
        .collect();
    Orchestrator::new(config, map, Arc::new(summarizer))
        .expect("default configuration must produce a valid orchestrator")
}
