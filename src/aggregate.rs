//! Merges provider results into a single final response.
//!
//! Usable results are filtered, deduplicated by content fingerprint, and
//! handed to the summarizer; if synthesis fails or times out the raw
//! contents are concatenated instead, so a degraded summarizer never costs
//! the user the underlying data.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::dispatch::{ProviderResult, ResultStatus};
use crate::providers::SourceAttribution;
use crate::summarizer::{build_provider_summary, Summarizer};

/// Phrases that mark a provider's text as an internal failure notice rather
/// than content worth synthesizing over.
const FAILURE_SIGNATURES: [&str; 7] = [
    "error occurred",
    "not recognized",
    "try queries such",
    "please contact",
    "no recent news",
    "no news found",
    "unrecognized",
];

/// Leading slice of normalized content used to spot near-duplicate results.
const FINGERPRINT_LEN: usize = 50;

pub const EMPTY_RESULTS_RESPONSE: &str = "I couldn't find any relevant information for that \
     query. Could you rephrase it, or ask about prices, your portfolio, or recent news?";

/// The orchestrator's final answer: response text plus the merged source
/// attributions that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub response: String,
    pub sources: Vec<SourceAttribution>,
}

pub struct Aggregator {
    summarizer: Arc<dyn Summarizer>,
    synthesis_timeout: Duration,
}

impl Aggregator {
    pub fn new(summarizer: Arc<dyn Summarizer>, synthesis_timeout: Duration) -> Self {
        Self {
            summarizer,
            synthesis_timeout,
        }
    }

    /// Merges dispatch results into one response. Error results and failure
    /// notices are dropped before synthesis; they have already been logged
    /// by the dispatcher.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn merge(
        &self,
        query: &str,
        results: &[ProviderResult],
        language: &str,
        style: &str,
    ) -> FinalResult {
        let usable = dedup_by_fingerprint(
            results
                .iter()
                .filter(|r| r.status == ResultStatus::Success)
                .filter(|r| !is_failure_notice(&r.content.as_text()))
                .collect(),
        );

        if usable.is_empty() {
            debug!("No usable provider results; returning fixed fallback");
            return FinalResult {
                response: EMPTY_RESULTS_RESPONSE.to_string(),
                sources: Vec::new(),
            };
        }

        let sources = merge_sources(&usable);
        let owned: Vec<ProviderResult> = usable.iter().map(|r| (*r).clone()).collect();
        let context = build_provider_summary(query, &owned);

        let response = match tokio::time::timeout(
            self.synthesis_timeout,
            self.summarizer.synthesize(query, &context, language, style),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => {
                warn!("Summarizer returned empty output; falling back to raw contents");
                concatenate_contents(&usable)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Synthesis failed; falling back to raw contents");
                concatenate_contents(&usable)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.synthesis_timeout.as_secs(),
                    "Synthesis timed out; falling back to raw contents"
                );
                concatenate_contents(&usable)
            }
        };

        FinalResult { response, sources }
    }
}

fn is_failure_notice(text: &str) -> bool {
    let lowered = text.to_lowercase();
    FAILURE_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

fn fingerprint(text: &str) -> String {
    let normalized = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.chars().take(FINGERPRINT_LEN).collect()
}

/// Keeps the first result for each content fingerprint, preserving wave
/// order so higher-confidence providers win ties.
fn dedup_by_fingerprint(results: Vec<&ProviderResult>) -> Vec<&ProviderResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(fingerprint(&r.content.as_text())))
        .collect()
}

/// Merges source lists in result order, dropping exact-label repeats.
fn merge_sources(results: &[&ProviderResult]) -> Vec<SourceAttribution> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for result in results {
        for source in &result.sources {
            if seen.insert(source.label.clone()) {
                merged.push(source.clone());
            }
        }
    }
    merged
}

fn concatenate_contents(results: &[&ProviderResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_text())
        .collect::<Vec<_>>()
        .join("\n\n")
}
