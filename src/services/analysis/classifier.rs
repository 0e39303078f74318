// Clause Classifier
// Weighted keyword scoring over the category tables

use crate::models::ClauseCategory;
use crate::services::analysis::rules::RuleTables;
use std::cmp::Reverse;
use std::sync::Arc;

#[derive(Clone)]
pub struct ClauseClassifier {
    rules: Arc<RuleTables>,
}

impl ClauseClassifier {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }

    /// Score per category, in tie-break priority order.
    ///
    /// A pattern contributes its weight once no matter how often it occurs.
    pub fn scores(&self, text: &str) -> Vec<(ClauseCategory, u32)> {
        ClauseCategory::PRIORITY
            .iter()
            .map(|&category| {
                let score = self
                    .rules
                    .categories()
                    .iter()
                    .filter(|set| set.category == category)
                    .flat_map(|set| set.patterns.iter())
                    .filter(|p| p.regex.is_match(text))
                    .map(|p| p.weight)
                    .sum();
                (category, score)
            })
            .collect()
    }

    /// Highest score wins; ties go to the lower [`ClauseCategory::priority_rank`].
    pub fn classify(&self, text: &str) -> ClauseCategory {
        self.scores(text)
            .into_iter()
            .filter(|&(_, score)| score > 0)
            .min_by_key(|&(category, score)| (Reverse(score), category.priority_rank()))
            .map(|(category, _)| category)
            .unwrap_or(ClauseCategory::General)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> ClauseClassifier {
        ClauseClassifier::new(Arc::new(RuleTables::builtin().unwrap()))
    }

    #[test]
    fn test_classify_liability() {
        let c = classifier();
        assert_eq!(
            c.classify("1. Liability: Vendor shall have unlimited liability for all damages."),
            ClauseCategory::Liability
        );
    }

    #[test]
    fn test_classify_termination() {
        let c = classifier();
        assert_eq!(
            c.classify("2. This agreement may be terminated at will."),
            ClauseCategory::Termination
        );
    }

    #[test]
    fn test_classify_financial_and_confidentiality() {
        let c = classifier();
        assert_eq!(
            c.classify("The Client shall pay all invoices within 30 days."),
            ClauseCategory::Financial
        );
        assert_eq!(
            c.classify("Recipient shall keep all Confidential Information in strict confidence and shall not disclose it."),
            ClauseCategory::Confidentiality
        );
    }

    #[test]
    fn test_no_match_is_general() {
        let c = classifier();
        assert_eq!(c.classify("This document is governed by common sense."), ClauseCategory::General);
        assert_eq!(c.classify(""), ClauseCategory::General);
    }

    #[test]
    fn test_repeated_keyword_counts_once() {
        let c = classifier();
        let scores = c.scores("terminate terminate terminate");
        let termination = scores
            .iter()
            .find(|(cat, _)| *cat == ClauseCategory::Termination)
            .map(|(_, s)| *s);
        assert_eq!(termination, Some(3));
    }

    #[test]
    fn test_tie_goes_to_priority() {
        // liability (3) ties warranty (3)
        let c = classifier();
        assert_eq!(c.classify("liable warranty"), ClauseCategory::Liability);
        // termination (3) ties financial (3)
        assert_eq!(c.classify("payment terminates"), ClauseCategory::Termination);
    }

    proptest! {
        #[test]
        fn prop_classify_is_total_and_deterministic(text in "\\PC{0,200}") {
            let c = classifier();
            let first = c.classify(&text);
            prop_assert!(ClauseCategory::PRIORITY.contains(&first));
            prop_assert_eq!(first, c.classify(&text));
            if c.scores(&text).iter().all(|(_, s)| *s == 0) {
                prop_assert_eq!(first, ClauseCategory::General);
            }
        }
    }
}
