// Risk Summary
// Document-level roll-up and per-clause recommendations

use crate::models::{
    Clause, ClauseCategory, ClauseImportance, RiskAssessment, RiskLevel, RiskSummary,
};
use std::collections::{BTreeMap, HashMap};

const TOP_RULES: usize = 5;

fn level_advice(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::High => &[
            "Consider consulting a lawyer before signing.",
            "Try to negotiate more favorable terms.",
        ],
        RiskLevel::Medium => &[
            "Review this clause carefully and understand its implications.",
            "Consider asking for clarifications or modifications.",
        ],
        RiskLevel::Low => &[],
    }
}

fn category_advice(category: ClauseCategory) -> &'static [&'static str] {
    match category {
        ClauseCategory::Liability => &[
            "Try to limit liability to direct damages only.",
            "Request mutual liability limitations.",
        ],
        ClauseCategory::Termination => &[
            "Request reasonable notice periods.",
            "Ensure you have similar termination rights.",
        ],
        ClauseCategory::Warranty => &[
            "Ensure warranties are reasonable and achievable.",
            "Limit warranty periods to reasonable timeframes.",
        ],
        ClauseCategory::Financial => &[
            "Ensure payment terms are clearly defined.",
            "Request protection against late payment penalties.",
        ],
        ClauseCategory::Confidentiality => &[
            "Make sure the confidentiality period has a clear end date.",
        ],
        ClauseCategory::General => &[],
    }
}

/// Advice tied to a specific built-in rule id.
pub fn rule_advice(rule_id: &str) -> Option<&'static str> {
    let advice = match rule_id {
        "unlimited_liability" => "Request a liability cap or limitation.",
        "personal_guarantee" => "Try to limit personal guarantees to corporate obligations only.",
        "broad_indemnity" => "Narrow the indemnity to claims caused by your own fault.",
        "termination_without_notice" => "Ask for a written notice period before termination.",
        "waiver_of_rights" => "Do not give up legal rights without understanding what you lose.",
        "class_action_waiver" => "Check whether you can still bring claims together with others.",
        "ip_assignment" => "Retain rights to your pre-existing intellectual property.",
        "non_compete" => "Negotiate reasonable geographic and time limitations.",
        "liquidated_damages" => "Make sure pre-set damages are proportionate to the real loss.",
        "at_will_termination" => "Ask for termination rights that apply equally to both sides.",
        "automatic_renewal" => "Note the cancellation deadline so the contract does not renew unnoticed.",
        "unilateral_amendment" => "Require written agreement from both sides for any change.",
        "late_payment_penalty" => "Negotiate a grace period before late fees apply.",
        "non_refundable" => "Ask for a refund if the service is not delivered.",
        "attorney_fees" => "Ask for each side to bear its own legal costs.",
        "binding_arbitration" => "Understand where and how disputes will be decided.",
        _ => return None,
    };
    Some(advice)
}

/// Recommendations for one clause, deduplicated in a stable order.
pub fn clause_recommendations(category: ClauseCategory, risk: &RiskAssessment) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    };

    level_advice(risk.level).iter().for_each(|s| push(*s));
    if risk.level != RiskLevel::Low {
        category_advice(category).iter().for_each(|s| push(*s));
    }
    risk.matched_rules
        .iter()
        .filter_map(|id| rule_advice(id))
        .for_each(|s| push(s));
    out
}

fn overall_level(total: usize, high: usize, medium: usize) -> RiskLevel {
    if high > 0 {
        RiskLevel::High
    } else if medium * 10 > total * 3 {
        // more than 30% of clauses are medium
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn overall_recommendation(overall: RiskLevel, high: usize, total: usize) -> String {
    match overall {
        RiskLevel::High => format!(
            "This document contains {} high-risk clause(s) out of {} total. Review the flagged clauses and seek advice before signing.",
            high, total
        ),
        RiskLevel::Medium => {
            "This document has moderate risk. Read the flagged clauses carefully and ask about any terms you do not understand.".to_string()
        }
        RiskLevel::Low => "This document appears to have low risk overall.".to_string(),
    }
}

/// Roll clause assessments up into a document summary.
///
/// Clauses without a risk assessment count as Low.
pub fn summarize_risks(clauses: &[Clause]) -> RiskSummary {
    let total = clauses.len();
    let mut high = 0usize;
    let mut medium = 0usize;
    let mut low = 0usize;
    let mut by_category: BTreeMap<ClauseCategory, usize> = BTreeMap::new();
    let mut by_importance: BTreeMap<ClauseImportance, usize> = BTreeMap::new();
    let mut rule_counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for clause in clauses {
        *by_category.entry(clause.category).or_insert(0) += 1;
        *by_importance.entry(clause.importance).or_insert(0) += 1;
        match clause.risk_level().unwrap_or_default() {
            RiskLevel::High => high += 1,
            RiskLevel::Medium => medium += 1,
            RiskLevel::Low => low += 1,
        }
        if let Some(risk) = &clause.risk {
            for id in &risk.matched_rules {
                let count = rule_counts.entry(id.as_str()).or_insert(0);
                if *count == 0 {
                    first_seen.push(id.as_str());
                }
                *count += 1;
            }
        }
    }

    // most frequent first, first occurrence breaks ties
    let mut top: Vec<(usize, &str)> = first_seen
        .iter()
        .map(|id| (rule_counts.get(id).copied().unwrap_or(0), *id))
        .collect();
    top.sort_by(|a, b| b.0.cmp(&a.0));
    let top_rules = top
        .into_iter()
        .take(TOP_RULES)
        .map(|(_, id)| id.to_string())
        .collect();

    let overall = overall_level(total, high, medium);
    RiskSummary {
        overall,
        total_clauses: total,
        high_count: high,
        medium_count: medium,
        low_count: low,
        by_category,
        by_importance,
        top_rules,
        recommendation: overall_recommendation(overall, high, total),
    }
}
