//! Deterministic query routing: keyword/pattern intent scoring plus
//! registry-driven candidate selection. There is no learned classification;
//! every score is auditable from the rules table.

pub mod intent;
pub mod router;
pub mod rules;

pub use intent::IntentScorer;
pub use router::{Candidate, Router};
pub use rules::RoutingRules;
