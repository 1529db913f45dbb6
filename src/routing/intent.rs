//! Pure keyword/pattern intent scoring.

use std::collections::HashMap;
use std::sync::Arc;

use crate::providers::ProviderId;
use crate::routing::rules::RoutingRules;

/// Scores a query's intent per provider from keyword evidence.
///
/// The pass is monotonic and order-independent: boosts only ever raise a
/// provider's score to a floor, and no state is shared across providers
/// during scoring.
#[derive(Clone)]
pub struct IntentScorer {
    rules: Arc<RoutingRules>,
}

/// True when `term` appears in `text`. Multi-word terms match as substrings;
/// single words must match a whole token so "ma" doesn't fire inside
/// "market".
fn contains_term(text: &str, words: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        text.contains(term)
    } else {
        words.iter().any(|w| *w == term)
    }
}

impl IntentScorer {
    pub fn new(rules: Arc<RoutingRules>) -> Self {
        Self { rules }
    }

    /// Confidence per provider in [0, 1]. Providers with no evidence are
    /// absent from the map. An empty or whitespace-only query scores every
    /// provider zero.
    pub fn score(&self, query: &str) -> HashMap<ProviderId, f32> {
        let mut scores = HashMap::new();
        if query.trim().is_empty() {
            return scores;
        }

        let text = query.to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for (id, keywords) in &self.rules.keywords {
            let strong = keywords
                .strong
                .iter()
                .filter(|kw| contains_term(&text, &words, kw.as_str()))
                .count() as f32;
            let weak = keywords
                .weak
                .iter()
                .filter(|kw| contains_term(&text, &words, kw.as_str()))
                .count() as f32;

            let mut score = 0.0;
            if strong > 0.0 {
                // Multiple strong matches compound beyond the base weight.
                score += 0.7 * strong + 0.2 * (strong - 1.0);
            }
            if weak > 0.0 {
                score += 0.3 * weak;
            }

            if score > 0.0 {
                scores.insert(*id, score.clamp(0.0, 1.0));
            }
        }

        for boost in &self.rules.boosts {
            let evidence = boost
                .evidence
                .iter()
                .any(|term| contains_term(&text, &words, term.as_str()));
            let entity = boost.entities.is_empty()
                || boost
                    .entities
                    .iter()
                    .any(|term| contains_term(&text, &words, term.as_str()));
            if evidence && entity {
                let entry = scores.entry(boost.provider).or_insert(0.0);
                *entry = entry.max(boost.floor.clamp(0.0, 1.0));
            }
        }

        scores
    }
}

impl Default for IntentScorer {
    fn default() -> Self {
        Self::new(Arc::new(RoutingRules::default()))
    }
}
