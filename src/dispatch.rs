//! Wave-ordered concurrent execution of routed candidates.
//!
//! Providers with no outstanding dependencies run together in a wave,
//! bounded by a shared semaphore; a dependent provider's call never starts
//! before its dependency's wave has fully completed. Success, empty, and
//! error all count as completion for ordering purposes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, CachedValue, ResultCache};
use crate::providers::{
    Provider, ProviderContent, ProviderId, ProviderOutcome, ProviderRegistry, SourceAttribution,
};
use crate::routing::Candidate;

/// Outcome tag for one provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Empty,
    Error,
}

/// Normalized result of one provider invocation. Immutable after creation;
/// owned by the dispatcher until handed to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: ProviderId,
    pub status: ResultStatus,
    pub content: ProviderContent,
    pub sources: Vec<SourceAttribution>,
    /// Raw provider payload, kept for diagnostics only.
    pub raw: Option<JsonValue>,
}

/// Per-request execution options.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub call_timeout: Duration,
    /// Whole-request deadline: remaining calls get the smaller of the
    /// per-call timeout and the time left, and an elapsed deadline turns
    /// pending candidates into timeout results.
    pub deadline: Option<Instant>,
}

/// What the dispatcher did for one request.
#[derive(Debug)]
pub struct DispatchReport {
    /// Success and error results, in wave order. Empty outcomes are excluded.
    pub results: Vec<ProviderResult>,
    /// Every provider scheduled, including dependencies pulled in that the
    /// router did not select itself.
    pub scheduled: Vec<ProviderId>,
}

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    cache: Arc<ResultCache>,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        providers: HashMap<ProviderId, Arc<dyn Provider>>,
        cache: Arc<ResultCache>,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            registry,
            providers,
            cache,
            semaphore,
        }
    }

    /// Executes the candidate list in dependency-ordered waves.
    #[instrument(skip(self, candidates, options), fields(candidates = candidates.len()))]
    pub async fn execute(
        &self,
        candidates: &[Candidate],
        options: &DispatchOptions,
    ) -> DispatchReport {
        let waves = self.plan_waves(candidates);
        let scheduled: Vec<ProviderId> = waves
            .iter()
            .flat_map(|wave| wave.iter().map(|c| c.provider))
            .collect();

        let mut results = Vec::new();
        for (index, wave) in waves.iter().enumerate() {
            debug!(
                wave = index + 1,
                providers = ?wave.iter().map(|c| c.provider).collect::<Vec<_>>(),
                "Dispatching wave"
            );
            let calls = wave.iter().map(|candidate| self.call_one(candidate, options));
            for result in join_all(calls).await.into_iter().flatten() {
                results.push(result);
            }
        }

        DispatchReport { results, scheduled }
    }

    /// Groups candidates into waves. Dependencies that were not routed
    /// themselves are pulled in as implicit candidates so the dependent
    /// provider has something to wait on; the registry's acyclicity check
    /// guarantees this terminates.
    fn plan_waves(&self, candidates: &[Candidate]) -> Vec<Vec<Candidate>> {
        let mut pending: Vec<Candidate> = candidates.to_vec();
        let mut ids: HashSet<ProviderId> = pending.iter().map(|c| c.provider).collect();

        let mut i = 0;
        while i < pending.len() {
            let provider = pending[i].provider;
            let query = pending[i].query.clone();
            if let Some(config) = self.registry.get(provider) {
                for dep in &config.dependencies {
                    if ids.insert(*dep) {
                        debug!(provider = %provider, dependency = %dep, "Scheduling unrouted dependency");
                        pending.push(Candidate {
                            provider: *dep,
                            query: query.clone(),
                            confidence: 0.0,
                        });
                    }
                }
            }
            i += 1;
        }

        let mut waves: Vec<Vec<Candidate>> = Vec::new();
        let mut done: HashSet<ProviderId> = HashSet::new();
        while !pending.is_empty() {
            let (ready, rest): (Vec<Candidate>, Vec<Candidate>) =
                pending.into_iter().partition(|c| {
                    self.registry
                        .get(c.provider)
                        .map(|config| config.dependencies.iter().all(|d| done.contains(d)))
                        .unwrap_or(true)
                });

            if ready.is_empty() {
                // Unreachable with a validated registry; drop the remainder
                // rather than loop forever.
                warn!(stranded = rest.len(), "Wave planning could not make progress");
                break;
            }

            done.extend(ready.iter().map(|c| c.provider));
            waves.push(ready);
            pending = rest;
        }

        waves
    }

    /// Runs one candidate: cache short-circuit, bounded invocation with
    /// timeout, normalization, cache write. Returns `None` for empty
    /// outcomes, which are excluded from aggregation.
    async fn call_one(
        &self,
        candidate: &Candidate,
        options: &DispatchOptions,
    ) -> Option<ProviderResult> {
        let id = candidate.provider;
        let config = self.registry.get(id)?;
        let cacheable = config.cache_ttl > chrono::Duration::zero();
        let cache_key = CacheKey::provider(id, &candidate.query);

        if cacheable {
            if let Some(CachedValue::Provider(result)) = self.cache.get(&cache_key).await {
                info!(provider = %id, "Serving provider result from cache");
                return Some(result);
            }
        }

        let Some(provider) = self.providers.get(&id) else {
            warn!(provider = %id, "No implementation registered for provider");
            return Some(error_result(
                id,
                format!("No implementation registered for the {id} provider."),
            ));
        };

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return Some(error_result(id, "Dispatcher is shutting down.".to_string()));
            }
        };

        let timeout = match effective_timeout(options) {
            Some(timeout) => timeout,
            None => {
                debug!(provider = %id, "Request deadline elapsed before call started");
                return Some(timeout_result(id, options.call_timeout));
            }
        };

        let outcome = tokio::time::timeout(timeout, provider.invoke(&candidate.query)).await;
        drop(permit);

        match outcome {
            Err(_) => {
                warn!(provider = %id, timeout_secs = timeout.as_secs(), "Provider call timed out");
                Some(timeout_result(id, timeout))
            }
            Ok(Err(err)) => {
                warn!(provider = %id, error = %err, "Provider call failed");
                Some(error_result(
                    id,
                    format!("Error occurred while querying {id}: {err}. The request continued without it."),
                ))
            }
            Ok(Ok(ProviderOutcome::Empty)) => {
                debug!(provider = %id, "Provider found nothing usable");
                None
            }
            Ok(Ok(ProviderOutcome::Content(payload))) => {
                let sources = if payload.sources.is_empty() {
                    vec![SourceAttribution::new(id.as_str(), 0.0)]
                } else {
                    payload.sources
                };

                let labels: Vec<&str> = sources.iter().map(|s| s.label.as_str()).collect();
                info!(provider = %id, sources = ?labels, "Provider sources attributed");

                let result = ProviderResult {
                    provider: id,
                    status: ResultStatus::Success,
                    content: payload.content,
                    sources,
                    raw: payload.raw,
                };

                if cacheable {
                    self.cache
                        .put(
                            cache_key,
                            CachedValue::Provider(result.clone()),
                            config.cache_ttl,
                        )
                        .await;
                }

                Some(result)
            }
        }
    }
}

fn effective_timeout(options: &DispatchOptions) -> Option<Duration> {
    match options.deadline {
        None => Some(options.call_timeout),
        Some(deadline) => {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                None
            } else {
                Some(options.call_timeout.min(remaining))
            }
        }
    }
}

fn error_result(id: ProviderId, message: String) -> ProviderResult {
    ProviderResult {
        provider: id,
        status: ResultStatus::Error,
        content: ProviderContent::Text(message),
        sources: vec![SourceAttribution::new(id.as_str(), 0.0)],
        raw: None,
    }
}

fn timeout_result(id: ProviderId, timeout: Duration) -> ProviderResult {
    error_result(
        id,
        format!(
            "The {id} provider timed out after {}s.",
            timeout.as_secs_f32()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_helpers::MockProvider;

    fn registry() -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::with_defaults(&Config::default()).unwrap())
    }

    fn dispatcher(providers: Vec<MockProvider>) -> Dispatcher {
        let map: HashMap<ProviderId, Arc<dyn Provider>> = providers
            .into_iter()
            .map(|p| (p.id(), Arc::new(p) as Arc<dyn Provider>))
            .collect();
        Dispatcher::new(
            registry(),
            map,
            Arc::new(ResultCache::new(true)),
            Arc::new(Semaphore::new(5)),
        )
    }

    fn candidate(provider: ProviderId, query: &str) -> Candidate {
        Candidate {
            provider,
            query: query.to_string(),
            confidence: 0.9,
        }
    }

    fn options() -> DispatchOptions {
        DispatchOptions {
            call_timeout: Duration::from_secs(5),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn dependency_never_shares_a_wave_with_its_dependent() {
        let dispatcher = dispatcher(vec![]);
        let waves = dispatcher.plan_waves(&[
            candidate(ProviderId::Notify, "send snapshot"),
            candidate(ProviderId::Holdings, "send snapshot"),
        ]);

        assert_eq!(waves.len(), 2);
        assert!(waves[0].iter().all(|c| c.provider == ProviderId::Holdings));
        assert!(waves[1].iter().all(|c| c.provider == ProviderId::Notify));
    }

    #[tokio::test]
    async fn unrouted_dependency_is_pulled_into_an_earlier_wave() {
        let dispatcher = dispatcher(vec![]);
        let waves = dispatcher.plan_waves(&[candidate(ProviderId::Notify, "send snapshot")]);

        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0][0].provider, ProviderId::Holdings);
        assert!((waves[0][0].confidence - 0.0).abs() < f32::EPSILON);
        assert_eq!(waves[1][0].provider, ProviderId::Notify);
    }

    #[tokio::test]
    async fn timeout_yields_error_result_without_killing_siblings() {
        let slow = MockProvider::text(ProviderId::Market, "too slow")
            .with_delay(Duration::from_secs(10));
        let fast = MockProvider::text(ProviderId::News, "markets rallied");
        let dispatcher = dispatcher(vec![slow, fast]);

        let report = dispatcher
            .execute(
                &[
                    candidate(ProviderId::Market, "price and news"),
                    candidate(ProviderId::News, "price and news"),
                ],
                &DispatchOptions {
                    call_timeout: Duration::from_millis(50),
                    deadline: None,
                },
            )
            .await;

        assert_eq!(report.results.len(), 2);
        let market = report
            .results
            .iter()
            .find(|r| r.provider == ProviderId::Market)
            .unwrap();
        assert_eq!(market.status, ResultStatus::Error);
        assert!(market.content.as_text().contains("timed out"));

        let news = report
            .results
            .iter()
            .find(|r| r.provider == ProviderId::News)
            .unwrap();
        assert_eq!(news.status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn failing_provider_is_isolated() {
        let bad = MockProvider::failing(ProviderId::Market, "upstream exploded");
        let good = MockProvider::text(ProviderId::News, "markets rallied");
        let dispatcher = dispatcher(vec![bad, good]);

        let report = dispatcher
            .execute(
                &[
                    candidate(ProviderId::Market, "price and news"),
                    candidate(ProviderId::News, "price and news"),
                ],
                &options(),
            )
            .await;

        let market = report
            .results
            .iter()
            .find(|r| r.provider == ProviderId::Market)
            .unwrap();
        assert_eq!(market.status, ResultStatus::Error);
        // The raw upstream message stays out of anything user-facing except
        // the sanitized diagnostic line.
        assert!(market.content.as_text().contains("Error occurred"));
        assert!(report
            .results
            .iter()
            .any(|r| r.provider == ProviderId::News && r.status == ResultStatus::Success));
    }

    #[tokio::test]
    async fn empty_outcome_is_excluded_not_errored() {
        let empty = MockProvider::empty(ProviderId::News);
        let dispatcher = dispatcher(vec![empty]);

        let report = dispatcher
            .execute(&[candidate(ProviderId::News, "any news")], &options())
            .await;

        assert!(report.results.is_empty());
        assert_eq!(report.scheduled, vec![ProviderId::News]);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_call() {
        let provider = MockProvider::text(ProviderId::Market, "AAPL trades at 198.42");
        let calls = provider.call_count();
        let dispatcher = dispatcher(vec![provider]);

        let cands = [candidate(ProviderId::Market, "aapl price")];
        dispatcher.execute(&cands, &options()).await;
        dispatcher.execute(&cands, &options()).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_provider_is_never_cached() {
        let provider = MockProvider::text(ProviderId::Notify, "sent");
        let calls = provider.call_count();
        let holdings = MockProvider::text(ProviderId::Holdings, "3 positions");
        let dispatcher = dispatcher(vec![provider, holdings]);

        let cands = [candidate(ProviderId::Notify, "send snapshot")];
        dispatcher.execute(&cands, &options()).await;
        dispatcher.execute(&cands, &options()).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn elapsed_deadline_converts_pending_calls_to_timeouts() {
        let provider = MockProvider::text(ProviderId::Market, "AAPL trades at 198.42");
        let dispatcher = dispatcher(vec![provider]);

        let report = dispatcher
            .execute(
                &[candidate(ProviderId::Market, "aapl price")],
                &DispatchOptions {
                    call_timeout: Duration::from_secs(5),
                    deadline: Some(Instant::now() - Duration::from_millis(1)),
                },
            )
            .await;

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status, ResultStatus::Error);
    }
}
