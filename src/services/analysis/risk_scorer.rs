// Risk Scorer
// Evaluates every in-scope risk rule against a clause

use crate::models::{ClauseCategory, RiskAssessment, RiskLevel};
use crate::services::analysis::rules::RuleTables;
use std::sync::Arc;

#[derive(Clone)]
pub struct RiskScorer {
    rules: Arc<RuleTables>,
}

impl RiskScorer {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }

    /// Level is the highest severity among matched rules; no match is Low
    /// with an empty rationale.
    pub fn score(&self, text: &str, category: ClauseCategory) -> RiskAssessment {
        let mut level = RiskLevel::Low;
        let mut matched_rules: Vec<String> = Vec::new();
        let mut rationales: Vec<String> = Vec::new();

        for rule in self.rules.risk_rules() {
            if !rule.scope.applies_to(category) {
                continue;
            }
            let Some(hit) = rule.regex.find(text) else {
                continue;
            };
            if matched_rules.iter().any(|id| id == &rule.id) {
                continue;
            }
            level = level.max(rule.severity);
            matched_rules.push(rule.id.clone());
            rationales.push(rule.render_rationale(hit.as_str()));
        }

        RiskAssessment {
            level,
            matched_rules,
            rationale: rationales.join(" "),
        }
    }
}
