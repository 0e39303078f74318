// Local Rule Simplifier
// Legal-term to plain-term substitution; the last link of the fallback chain

use crate::services::analysis::RuleTables;
use regex::Captures;
use std::sync::Arc;

#[derive(Clone)]
pub struct LocalSimplifier {
    rules: Arc<RuleTables>,
}

/// Carry the casing of the matched term over to its replacement.
fn match_case(matched: &str, plain: &str) -> String {
    let letters: Vec<char> = matched.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return plain.to_uppercase();
    }
    match (matched.chars().next(), plain.chars().next()) {
        (Some(m), Some(p)) if m.is_uppercase() && p.is_lowercase() => {
            let mut out: String = p.to_uppercase().collect();
            out.push_str(&plain[p.len_utf8()..]);
            out
        }
        _ => plain.to_string(),
    }
}

impl LocalSimplifier {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }

    /// Rewrite known legal terms in plain words. Never fails; text without
    /// known terms comes back with whitespace tidied.
    pub fn simplify(&self, text: &str) -> String {
        let table = self.rules.substitutions();
        let replaced = match table.matcher() {
            Some(re) => re
                .replace_all(text, |caps: &Captures| {
                    let matched = &caps[0];
                    match table.plain_for(matched) {
                        Some(plain) => match_case(matched, plain),
                        None => matched.to_string(),
                    }
                })
                .into_owned(),
            None => text.to_string(),
        };
        replaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
