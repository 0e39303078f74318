// SignSafe Data Models
// Documents, clauses and the analysis results attached to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============ Clause Taxonomy ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseCategory {
    Liability,
    Termination,
    Warranty,
    Financial,
    Confidentiality,
    General,
}

impl ClauseCategory {
    /// Tie-break order used by the classifier, highest priority first.
    pub const PRIORITY: [ClauseCategory; 6] = [
        ClauseCategory::Liability,
        ClauseCategory::Termination,
        ClauseCategory::Warranty,
        ClauseCategory::Financial,
        ClauseCategory::Confidentiality,
        ClauseCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liability => "liability",
            Self::Termination => "termination",
            Self::Warranty => "warranty",
            Self::Financial => "financial",
            Self::Confidentiality => "confidentiality",
            Self::General => "general",
        }
    }

    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "liability" => Some(Self::Liability),
            "termination" => Some(Self::Termination),
            "warranty" => Some(Self::Warranty),
            "financial" => Some(Self::Financial),
            "confidentiality" => Some(Self::Confidentiality),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Position in [`ClauseCategory::PRIORITY`]; lower wins ties.
    pub fn priority_rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for ClauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Risk ============

/// Declared low to high so that `Ord` gives severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Display color used by presentation layers.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Low => "green",
            Self::Medium => "orange",
            Self::High => "red",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How binding a clause reads: obligation terms make it High, softer
/// permissive or consent terms Medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClauseImportance {
    #[default]
    Low,
    Medium,
    High,
}

impl ClauseImportance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ClauseImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category-level plain explanation plus warnings triggered by the clause wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClauseExplanation {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Rule identifiers in rule-table order, without duplicates.
    pub matched_rules: Vec<String>,
    pub rationale: String,
}

impl RiskAssessment {
    pub fn is_flagged(&self) -> bool {
        !self.matched_rules.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub overall: RiskLevel,
    pub total_clauses: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub by_category: BTreeMap<ClauseCategory, usize>,
    pub by_importance: BTreeMap<ClauseImportance, usize>,
    /// Most frequently matched rule ids, most common first.
    pub top_rules: Vec<String>,
    pub recommendation: String,
}

// ============ Simplification ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Primary,
    Secondary,
    LocalFallback,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::LocalFallback => "local_fallback",
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Self::LocalFallback)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    QuotaExceeded,
    Auth,
    MalformedResponse,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Provider was not called because its circuit breaker is open.
    CircuitOpen,
    Failed { kind: ProviderErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplificationResult {
    /// The one provider whose output is `text`.
    pub provider: ProviderKind,
    pub text: String,
    /// True when an external provider produced the text.
    pub success: bool,
    /// Providers tried before `provider`, in chain order.
    #[serde(default)]
    pub attempts: Vec<ProviderAttempt>,
    pub latency_ms: i64,
}

impl SimplificationResult {
    pub fn failed_providers(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
            .map(|a| a.provider)
    }
}

// ============ Document ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    Numbered,
    Headings,
    Paragraphs,
    Sentences,
    /// No boundaries found; the whole text is one clause.
    Whole,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionInputError {
    #[error("extracted text is empty")]
    EmptyText,
    #[error("extracted text has no readable content after normalization")]
    Unreadable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub page_number: u32,
    #[serde(default)]
    pub char_count: usize,
}

/// Input handed over by the extraction layer (PDF/OCR).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub document_id: Option<String>,
    pub raw_text: String,
    #[serde(default)]
    pub pages: Option<Vec<PageMetadata>>,
}

impl ExtractedDocument {
    pub fn from_text(raw_text: impl Into<String>) -> Self {
        Self {
            document_id: None,
            raw_text: raw_text.into(),
            pages: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    pub index: usize,
    /// UTF-8 byte offset (0-based) into the normalized document text.
    pub start: usize,
    /// UTF-8 byte offset (end-exclusive) into the normalized document text.
    pub end: usize,
    pub text: String,
    pub category: ClauseCategory,
    #[serde(default)]
    pub importance: ClauseImportance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ClauseExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplification: Option<SimplificationResult>,
}

impl Clause {
    /// Unannotated clause for a segment of the normalized text.
    pub fn from_span(index: usize, start: usize, end: usize, text: String) -> Self {
        Self {
            index,
            start,
            end,
            text,
            category: ClauseCategory::General,
            importance: ClauseImportance::Low,
            explanation: None,
            risk: None,
            simplification: None,
        }
    }

    pub fn simplified_text(&self) -> Option<&str> {
        self.simplification.as_ref().map(|s| s.text.as_str())
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.risk.as_ref().map(|r| r.level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub text: String,
    pub clauses: Vec<Clause>,
    pub strategy: SegmentationStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_warning: Option<ExtractionInputError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Every clause has a risk assessment, an explanation and simplified text.
    pub fn is_fully_processed(&self) -> bool {
        self.clauses.iter().all(|c| {
            c.risk.is_some() && c.explanation.is_some() && c.simplification.is_some()
        })
    }
}

// ============ Translation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranslationItemResult {
    Translated { text: String },
    Failed { kind: ProviderErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutcome {
    pub clause_index: usize,
    #[serde(flatten)]
    pub result: TranslationItemResult,
}

impl TranslationOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self.result, TranslationItemResult::Failed { .. })
    }

    pub fn translated_text(&self) -> Option<&str> {
        match &self.result {
            TranslationItemResult::Translated { text } => Some(text),
            TranslationItemResult::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationProgress {
    pub job_id: String,
    pub target_language: String,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub state: TranslationState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert_eq!(RiskLevel::default(), RiskLevel::Low);
    }

    #[test]
    fn test_unannotated_clause_defaults() {
        let clause = Clause::from_span(3, 10, 14, "Text".to_string());
        assert_eq!(clause.category, ClauseCategory::General);
        assert_eq!(clause.importance, ClauseImportance::Low);
        assert!(clause.explanation.is_none());

        // older JSON without importance still loads
        let json = r#"{"index":0,"start":0,"end":1,"text":"x","category":"general"}"#;
        let parsed: Clause = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.importance, ClauseImportance::Low);
    }

    #[test]
    fn test_category_priority_rank() {
        assert_eq!(ClauseCategory::Liability.priority_rank(), 0);
        assert_eq!(ClauseCategory::General.priority_rank(), 5);
        assert!(ClauseCategory::Termination.priority_rank() < ClauseCategory::Warranty.priority_rank());
    }

    #[test]
    fn test_category_parse_roundtrips_names() {
        for cat in ClauseCategory::PRIORITY {
            assert_eq!(ClauseCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(ClauseCategory::parse("intellectual_property"), None);
    }

    #[test]
    fn test_attempt_serialization_is_flat() {
        let attempt = ProviderAttempt {
            provider: ProviderKind::Primary,
            outcome: AttemptOutcome::Failed {
                kind: ProviderErrorKind::QuotaExceeded,
                message: "429".to_string(),
            },
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["provider"], "primary");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "quota_exceeded");
    }

    #[test]
    fn test_failed_providers_excludes_skipped() {
        let result = SimplificationResult {
            provider: ProviderKind::LocalFallback,
            text: "x".to_string(),
            success: false,
            attempts: vec![
                ProviderAttempt {
                    provider: ProviderKind::Primary,
                    outcome: AttemptOutcome::CircuitOpen,
                },
                ProviderAttempt {
                    provider: ProviderKind::Secondary,
                    outcome: AttemptOutcome::Failed {
                        kind: ProviderErrorKind::Timeout,
                        message: "timeout".to_string(),
                    },
                },
            ],
            latency_ms: 0,
        };
        let failed: Vec<_> = result.failed_providers().collect();
        assert_eq!(failed, vec![ProviderKind::Secondary]);
    }
}
