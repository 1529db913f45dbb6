//! Candidate selection: intent scores + trigger patterns against the
//! registry, filtered by a (possibly relaxed) confidence threshold.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::providers::{ProviderId, ProviderRegistry};
use crate::routing::intent::IntentScorer;

/// A provider selected for one request, with its computed confidence.
/// Created per-request and consumed once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: ProviderId,
    pub query: String,
    /// Always clamped to [0, 1].
    pub confidence: f32,
}

/// Combines the intent scorer and the provider registry into an ordered,
/// deduplicated candidate list.
#[derive(Clone)]
pub struct Router {
    scorer: IntentScorer,
    registry: Arc<ProviderRegistry>,
    confidence_threshold: f32,
    multi_intent_delta: f32,
    threshold_floor: f32,
    pattern_match_floor: f32,
}

impl Router {
    pub fn new(scorer: IntentScorer, registry: Arc<ProviderRegistry>, config: &Config) -> Self {
        Self {
            scorer,
            registry,
            confidence_threshold: config.confidence_threshold,
            multi_intent_delta: config.multi_intent_delta,
            threshold_floor: config.threshold_floor,
            pattern_match_floor: config.pattern_match_floor,
        }
    }

    /// Routes a query to an ordered candidate list.
    ///
    /// An empty result signals an out-of-scope query; producing the graceful
    /// response for that case is the orchestrator's job, not the router's.
    pub fn route(&self, query: &str) -> Vec<Candidate> {
        let intent_scores = self.scorer.score(query);

        // Multi-intent queries are judged more permissively: a query mixing
        // "news" and "portfolio" should trigger both providers.
        let threshold = if intent_scores.len() > 1 {
            (self.confidence_threshold - self.multi_intent_delta).max(self.threshold_floor)
        } else {
            self.confidence_threshold
        };

        let mut selected: Vec<Candidate> = Vec::new();
        for config in self.registry.all() {
            let mut confidence = intent_scores.get(&config.id).copied().unwrap_or(0.0);
            // A trigger-pattern match raises confidence to the floor without
            // lowering a higher intent score.
            if config.trigger.is_match(query) {
                confidence = confidence.max(self.pattern_match_floor);
            }

            if confidence >= threshold {
                debug!(
                    provider = %config.id,
                    confidence,
                    threshold,
                    "Provider selected for query"
                );
                selected.push(Candidate {
                    provider: config.id,
                    query: query.to_string(),
                    confidence: confidence.clamp(0.0, 1.0),
                });
            }
        }

        if selected.is_empty() {
            debug!("No providers cleared the threshold; query may be out of scope");
            return selected;
        }

        // Confidence is the primary signal; registry priority only breaks
        // ties between equal confidences.
        selected.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let pa = self.registry.get(a.provider).map(|c| c.priority).unwrap_or(u8::MAX);
                    let pb = self.registry.get(b.provider).map(|c| c.priority).unwrap_or(u8::MAX);
                    pa.cmp(&pb)
                })
        });

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        let config = Config::default();
        let registry = Arc::new(ProviderRegistry::with_defaults(&config).unwrap());
        Router::new(IntentScorer::default(), registry, &config)
    }

    #[test]
    fn no_evidence_means_no_routing() {
        assert!(router().route("how tall is the eiffel tower").is_empty());
        assert!(router().route("").is_empty());
    }

    #[test]
    fn strong_single_intent_routes_one_provider() {
        let candidates = router().route("What is AAPL's current price?");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider, ProviderId::Market);
        assert!(candidates[0].confidence >= 0.7);
    }

    #[test]
    fn multi_intent_query_routes_both_providers() {
        let candidates = router().route("latest news on my portfolio");
        let ids: Vec<ProviderId> = candidates.iter().map(|c| c.provider).collect();
        assert!(ids.contains(&ProviderId::News));
        assert!(ids.contains(&ProviderId::Holdings));
    }

    #[test]
    fn candidates_are_sorted_by_confidence_then_priority() {
        let candidates = router().route("latest news on my portfolio");
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn no_provider_appears_twice() {
        let candidates = router().route("news news news latest latest portfolio holdings");
        let mut ids: Vec<ProviderId> = candidates.iter().map(|c| c.provider).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn pattern_match_alone_clears_the_base_threshold() {
        // "stock summary" hits the market trigger pattern; the keyword
        // formula alone gives 0.7 from "stock", the pattern keeps it in even
        // when scoring misses.
        let candidates = router().route("give me a stock summary");
        assert!(candidates.iter().any(|c| c.provider == ProviderId::Market));
    }

    #[test]
    fn snapshot_query_routes_notify() {
        let candidates = router().route("Send me my daily snapshot");
        let ids: Vec<ProviderId> = candidates.iter().map(|c| c.provider).collect();
        assert!(ids.contains(&ProviderId::Notify));
    }
}
