// Plain-Language Simplification
// Fallback chain over external providers ending in local substitution rules

pub mod local_rules;
pub mod orchestrator;

pub use local_rules::LocalSimplifier;
pub use orchestrator::{ExternalStage, SimplificationOrchestrator, Strategy};
