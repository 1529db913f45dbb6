//! Keyword and boost tables driving intent scoring.
//!
//! Kept as data rather than control flow so the rules can be versioned,
//! loaded from external configuration, and tested independently of the
//! dispatch logic.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderId;

/// High-precision ("strong") and low-precision ("weak") evidence terms for
/// one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSet {
    pub strong: Vec<String>,
    pub weak: Vec<String>,
}

/// Deterministic boost: when evidence and (optionally) an entity term are
/// both present, the provider's score is raised to at least `floor`, never
/// lowered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostRule {
    pub provider: ProviderId,
    /// Any of these terms must appear.
    pub evidence: Vec<String>,
    /// If non-empty, one of these entity terms must also appear.
    #[serde(default)]
    pub entities: Vec<String>,
    pub floor: f32,
}

/// The full scoring rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRules {
    pub keywords: HashMap<ProviderId, KeywordSet>,
    pub boosts: Vec<BoostRule>,
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// Built-in rule table. External deployments can deserialize a replacement
/// from JSON; tests and the default orchestrator use this one.
pub static DEFAULT_RULES: Lazy<RoutingRules> = Lazy::new(|| {
    let mut keywords = HashMap::new();
    keywords.insert(
        ProviderId::Market,
        KeywordSet {
            strong: terms(&[
                "price",
                "ticker",
                "quote",
                "trading",
                "share",
                "stock",
                "moving average",
            ]),
            weak: terms(&["current", "value", "worth"]),
        },
    );
    keywords.insert(
        ProviderId::Holdings,
        KeywordSet {
            strong: terms(&[
                "portfolio",
                "holdings",
                "my stocks",
                "allocation",
                "positions",
                "my holdings",
            ]),
            weak: terms(&["performance", "return", "total"]),
        },
    );
    keywords.insert(
        ProviderId::News,
        KeywordSet {
            strong: terms(&["news", "latest", "recent", "breaking", "headlines", "update"]),
            weak: terms(&["today", "this week"]),
        },
    );
    keywords.insert(
        ProviderId::Knowledge,
        KeywordSet {
            strong: terms(&[
                "explain",
                "define",
                "how does",
                "tell me about",
                "proxy statement",
                "annual report",
            ]),
            weak: terms(&["information", "details"]),
        },
    );
    keywords.insert(
        ProviderId::Notify,
        KeywordSet {
            strong: terms(&["email", "send", "notify", "report", "snapshot", "mail"]),
            weak: terms(&["daily", "summary"]),
        },
    );

    let boosts = vec![
        // A stock word next to a recognizable instrument name is market
        // intent even when the keyword formula scores lower.
        BoostRule {
            provider: ProviderId::Market,
            evidence: terms(&["stock", "price", "ticker", "quote", "shares"]),
            entities: terms(&[
                "tesla", "apple", "microsoft", "google", "amazon", "meta", "nvidia", "tsla",
                "aapl", "msft", "googl", "amzn", "nvda",
            ]),
            floor: 0.8,
        },
        BoostRule {
            provider: ProviderId::Holdings,
            evidence: terms(&["my", "holdings", "portfolio", "top", "allocation"]),
            entities: Vec::new(),
            floor: 0.6,
        },
        BoostRule {
            provider: ProviderId::Notify,
            evidence: terms(&["send", "email", "mail", "snapshot", "report", "daily"]),
            entities: Vec::new(),
            floor: 0.7,
        },
        BoostRule {
            provider: ProviderId::News,
            evidence: terms(&["news", "latest", "recent", "update", "headlines"]),
            entities: Vec::new(),
            floor: 0.7,
        },
    ];

    RoutingRules { keywords, boosts }
});

impl Default for RoutingRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}
