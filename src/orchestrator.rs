//! Top-level entry point tying routing, dispatch, and aggregation together.
//!
//! `Orchestrator::handle` never returns an error: every internal failure is
//! absorbed into a user-facing response at the stage where it happens, so
//! callers always get text back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::aggregate::{Aggregator, FinalResult};
use crate::cache::{CacheKey, CacheStats, CachedValue, ResultCache};
use crate::config::Config;
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::errors::AppError;
use crate::providers::{Provider, ProviderId, ProviderRegistry};
use crate::routing::{IntentScorer, Router, RoutingRules};
use crate::summarizer::{build_small_talk_prompt, Summarizer};

const IDENTITY_RESPONSE: &str = "Hey! I'm your finance assistant. I can look up market \
     prices, summarize your portfolio, explain financial concepts, send portfolio \
     snapshots, and surface recent market news. What would you like to know?";

const GREETING_FALLBACK: &str = "Hello! How can I help you with your finances today?";

const REDIRECT_FALLBACK: &str = "I can help with stock prices, your portfolio, financial \
     concepts, and recent market news. Could you rephrase your question?";

const GREETINGS: [&str; 9] = [
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "what's up",
    "greetings",
];

const IDENTITY_PHRASES: [&str; 3] = ["who are you", "what are you", "what can you do"];

/// One orchestration request. Language and style fall back to the
/// configured defaults when not set.
#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    pub query: String,
    pub language: Option<String>,
    pub style: Option<String>,
}

impl OrchestrateRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language: None,
            style: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// What `handle` produced and how.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    pub result: FinalResult,
    /// Providers the dispatcher scheduled, dependencies included. Empty for
    /// cached and small-talk responses.
    pub providers_used: Vec<ProviderId>,
    /// True when the whole response came from the final-response cache.
    pub cache_hit: bool,
}

pub struct Orchestrator {
    config: Config,
    router: Router,
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    summarizer: Arc<dyn Summarizer>,
    cache: Arc<ResultCache>,
}

impl Orchestrator {
    /// Builds an orchestrator over the given provider implementations using
    /// the built-in routing rules.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the default registry fails
    /// validation, which only happens when TTL overrides or rules are
    /// inconsistent.
    pub fn new(
        config: Config,
        providers: HashMap<ProviderId, Arc<dyn Provider>>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, AppError> {
        let registry = Arc::new(ProviderRegistry::with_defaults(&config)?);
        let scorer = IntentScorer::new(Arc::new(RoutingRules::default()));
        let router = Router::new(scorer, Arc::clone(&registry), &config);
        let cache = Arc::new(ResultCache::new(config.enable_cache));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let dispatcher = Dispatcher::new(registry, providers, Arc::clone(&cache), semaphore);
        let aggregator = Aggregator::new(
            Arc::clone(&summarizer),
            Duration::from_secs(config.synthesis_timeout_secs),
        );

        Ok(Self {
            config,
            router,
            dispatcher,
            aggregator,
            summarizer,
            cache,
        })
    }

    /// Handles a query with the configured default language and style.
    pub async fn handle(&self, query: &str) -> HandleOutcome {
        self.handle_with(OrchestrateRequest::new(query)).await
    }

    #[instrument(skip(self, request), fields(query_len = request.query.len()))]
    pub async fn handle_with(&self, request: OrchestrateRequest) -> HandleOutcome {
        let query = request.query.trim();
        let language = request
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        let style = request.style.as_deref().unwrap_or(&self.config.default_style);

        if query.is_empty() {
            return HandleOutcome {
                result: FinalResult {
                    response: REDIRECT_FALLBACK.to_string(),
                    sources: Vec::new(),
                },
                providers_used: Vec::new(),
                cache_hit: false,
            };
        }

        let final_key = CacheKey::final_response(query);
        let final_ttl = chrono::Duration::seconds(self.config.final_response_ttl_secs as i64);
        if let Some(CachedValue::Final(result)) = self.cache.get(&final_key).await {
            info!("Serving final response from cache");
            return HandleOutcome {
                result,
                providers_used: Vec::new(),
                cache_hit: true,
            };
        }

        let candidates = self.router.route(query);
        if candidates.is_empty() {
            let result = self.small_talk(query, language, style).await;
            self.cache
                .put(final_key, CachedValue::Final(result.clone()), final_ttl)
                .await;
            return HandleOutcome {
                result,
                providers_used: Vec::new(),
                cache_hit: false,
            };
        }

        info!(
            providers = ?candidates.iter().map(|c| c.provider).collect::<Vec<_>>(),
            "Routing selected providers"
        );

        let options = DispatchOptions {
            call_timeout: Duration::from_secs(self.config.call_timeout_secs),
            deadline: None,
        };
        let report = self.dispatcher.execute(&candidates, &options).await;
        let result = self
            .aggregator
            .merge(query, &report.results, language, style)
            .await;

        self.cache
            .put(final_key, CachedValue::Final(result.clone()), final_ttl)
            .await;

        HandleOutcome {
            result,
            providers_used: report.scheduled,
            cache_hit: false,
        }
    }

    /// Answers a query no provider matched. Identity questions get a fixed
    /// capability blurb; everything else goes through the summarizer with a
    /// small-talk prompt, with a static fallback if that fails.
    async fn small_talk(&self, query: &str, language: &str, style: &str) -> FinalResult {
        let lowered = query.to_lowercase();
        if IDENTITY_PHRASES.iter().any(|p| lowered.contains(p)) {
            return FinalResult {
                response: IDENTITY_RESPONSE.to_string(),
                sources: Vec::new(),
            };
        }

        let fallback = if is_greeting(query) {
            GREETING_FALLBACK
        } else {
            REDIRECT_FALLBACK
        };

        let prompt = build_small_talk_prompt(query, language, style);
        let timeout = Duration::from_secs(self.config.synthesis_timeout_secs);
        let response = match tokio::time::timeout(
            timeout,
            self.summarizer.synthesize(query, &prompt, language, style),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                warn!("Small-talk synthesis unavailable; using static fallback");
                fallback.to_string()
            }
        };

        FinalResult {
            response,
            sources: Vec::new(),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

/// True for short social openers. Only consulted after routing found no
/// provider, so a greeting followed by a real question never lands here.
pub fn is_greeting(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    let lowered = lowered.trim_end_matches(['!', '.', '?']);
    GREETINGS
        .iter()
        .any(|g| lowered == *g || lowered.starts_with(&format!("{g} ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_detection_matches_leading_phrase() {
        assert!(is_greeting("hello"));
        assert!(is_greeting("Hey!"));
        assert!(is_greeting("good morning there"));
        assert!(!is_greeting("tell me about dividends"));
    }
}
