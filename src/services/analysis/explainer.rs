// Clause Explainer
// Importance rating and category explanations from the rule tables

use crate::models::{ClauseCategory, ClauseExplanation, ClauseImportance};
use crate::services::analysis::rules::RuleTables;
use std::sync::Arc;

#[derive(Clone)]
pub struct ClauseExplainer {
    rules: Arc<RuleTables>,
}

impl ClauseExplainer {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }

    /// The first tier with a matching term decides; nothing matching is Low.
    pub fn importance(&self, text: &str) -> ClauseImportance {
        self.rules
            .importance()
            .tiers()
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(importance, _)| *importance)
            .unwrap_or_default()
    }

    /// Base text for the category, plus every in-scope warning whose pattern
    /// matches, in table order.
    pub fn explain(&self, text: &str, category: ClauseCategory) -> ClauseExplanation {
        let table = self.rules.explanations();
        let warnings = table
            .warnings()
            .iter()
            .filter(|w| w.scope.applies_to(category) && w.regex.is_match(text))
            .map(|w| w.message.clone())
            .collect();
        ClauseExplanation {
            text: table.base_for(category).to_string(),
            warnings,
        }
    }
}
