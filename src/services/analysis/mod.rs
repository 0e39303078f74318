// Clause Analysis Module
// Rule-driven classification, risk scoring and explanations

pub mod classifier;
pub mod explainer;
pub mod risk_scorer;
pub mod rules;
pub mod summary;

pub use classifier::ClauseClassifier;
pub use explainer::ClauseExplainer;
pub use risk_scorer::RiskScorer;
pub use rules::{
    ExplanationTable, ExplanationWarning, ImportanceTable, RiskRule, RuleScope, RuleTables,
    SubstitutionTable,
};
pub use summary::{clause_recommendations, rule_advice, summarize_risks};
