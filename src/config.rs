use std::collections::HashMap;

use serde::Deserialize;

use crate::providers::ProviderId;

/// Configuration surface for the orchestration core.
///
/// Fixed at construction and never re-read live. Every knob has an
/// environment-variable override (via `Config::load`) and a compiled-in
/// default.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Maximum number of provider calls in flight at once across a request.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-provider-call timeout in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Timeout applied to each summarizer synthesis call, in seconds.
    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    /// Minimum confidence a provider must clear to be routed to.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Amount the threshold is lowered for multi-intent queries.
    #[serde(default = "default_multi_intent_delta")]
    pub multi_intent_delta: f32,

    /// The threshold never drops below this, multi-intent or not.
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: f32,

    /// Confidence floor granted when a provider's trigger pattern matches.
    #[serde(default = "default_pattern_match_floor")]
    pub pattern_match_floor: f32,

    /// Result caching on/off switch.
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,

    /// TTL for merged final responses, in seconds. 0 disables the bucket.
    #[serde(default = "default_final_response_ttl_secs")]
    pub final_response_ttl_secs: u64,

    /// Per-provider cache TTL overrides in seconds (0 = never cache that
    /// provider). Providers absent here keep their registry defaults.
    #[serde(default)]
    pub provider_ttl_overrides: HashMap<ProviderId, u64>,

    /// Language the summarizer answers in when the caller doesn't specify.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Response style when the caller doesn't specify.
    #[serde(default = "default_style")]
    pub default_style: String,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_synthesis_timeout_secs() -> u64 {
    30
}

fn default_confidence_threshold() -> f32 {
    0.4
}

fn default_multi_intent_delta() -> f32 {
    0.1
}

fn default_threshold_floor() -> f32 {
    0.2
}

fn default_pattern_match_floor() -> f32 {
    0.5
}

fn default_enable_cache() -> bool {
    true
}

fn default_final_response_ttl_secs() -> u64 {
    300
}

fn default_language() -> String {
    "English".to_string()
}

fn default_style() -> String {
    "professional".to_string()
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `anyhow::Error` if an environment variable is present but has
    /// an invalid format.
    pub fn load() -> Result<Self, anyhow::Error> {
        envy::prefixed("FINSIGHT_")
            .from_env::<Self>()
            .map_err(anyhow::Error::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            call_timeout_secs: default_call_timeout_secs(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            confidence_threshold: default_confidence_threshold(),
            multi_intent_delta: default_multi_intent_delta(),
            threshold_floor: default_threshold_floor(),
            pattern_match_floor: default_pattern_match_floor(),
            enable_cache: default_enable_cache(),
            final_response_ttl_secs: default_final_response_ttl_secs(),
            provider_ttl_overrides: HashMap::new(),
            default_language: default_language(),
            default_style: default_style(),
        }
    }
}
