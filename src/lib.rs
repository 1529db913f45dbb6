//! Query orchestration core for a finance assistant.
//!
//! Takes a natural-language query, scores it against provider intents,
//! routes it to the matching data providers, runs them concurrently in
//! dependency order with caching, and merges the results into one
//! synthesized response.
//!
//! The crate is transport-agnostic: callers supply [`providers::Provider`]
//! and [`summarizer::Summarizer`] implementations and drive everything
//! through [`orchestrator::Orchestrator`].

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod providers;
pub mod routing;
pub mod summarizer;
pub mod test_helpers;

pub use aggregate::{Aggregator, FinalResult};
pub use cache::{CacheStats, ResultCache};
pub use config::Config;
pub use dispatch::{DispatchReport, Dispatcher, ProviderResult, ResultStatus};
pub use errors::AppError;
pub use orchestrator::{HandleOutcome, OrchestrateRequest, Orchestrator};
pub use providers::{
    Provider, ProviderContent, ProviderError, ProviderId, ProviderOutcome, ProviderPayload,
    ProviderRegistry, SourceAttribution,
};
pub use routing::{Candidate, IntentScorer, Router, RoutingRules};
pub use summarizer::Summarizer;
