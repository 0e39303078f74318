// SignSafe Core Services
// Clause pipeline, provider fallback and translation

pub mod analysis;
pub mod clause_segmenter;
pub mod config_store;
pub mod pipeline;
pub mod providers;
pub mod resilience;
pub mod simplification;
pub mod text_processor;
pub mod translation;

pub use config_store::*;
pub use text_processor::*;

pub use analysis::{
    clause_recommendations,
    rule_advice,
    summarize_risks,
    ClauseClassifier,
    ClauseExplainer,
    RiskScorer,
    RuleTables,
};
pub use clause_segmenter::{ClauseSegmenter, ClauseSpan};
pub use pipeline::DocumentPipeline;
pub use providers::{
    ProviderClient,
    ProviderEndpoint,
    ProviderError,
    RemoteSimplifier,
    RemoteTranslator,
    SimplificationBackend,
    TranslationBackend,
};
pub use resilience::{
    BreakerPermit,
    BreakerState,
    CircuitBreaker,
    ProviderGate,
    ProviderGates,
    RateLimiter,
};
pub use simplification::{LocalSimplifier, SimplificationOrchestrator};
pub use translation::{
    find_language,
    supported_languages,
    CancelHandle,
    Language,
    TranslationBatcher,
    TranslationError,
    TranslationItem,
    TranslationJob,
};
