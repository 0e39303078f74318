// Clause Segmenter
// Splits normalized contract text into ordered clause spans

use crate::models::SegmentationStrategy;
use crate::services::config_store::SegmentationConfig;
use crate::services::text_processor::split_sentences_advanced;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Structural tiers tried in order before sentence grouping.
const STRUCTURAL_TIERS: [SegmentationStrategy; 3] = [
    SegmentationStrategy::Numbered,
    SegmentationStrategy::Headings,
    SegmentationStrategy::Paragraphs,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ClauseSpan {
    /// Span over `text[start..end]` with surrounding whitespace removed.
    fn trimmed(text: &str, start: usize, end: usize) -> Option<Self> {
        let slice = &text[start..end];
        let trimmed = slice.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lead = slice.len() - slice.trim_start().len();
        Some(Self {
            start: start + lead,
            end: start + lead + trimmed.len(),
            text: trimmed.to_string(),
        })
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn numbering_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i:(?:section|article|clause)\s+\d{1,3}(?:\.\d{1,3})*)|\d{1,3}(?:\.\d{1,3})+\.?\s|\d{1,3}[.)]\s|\((?:[a-zA-Z]|[ivxlcIVXLC]{1,6}|\d{1,3})\)\s",
        )
        .expect("numbering regex")
    })
}

fn letter_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([A-Z])\.\s").expect("letter marker regex"))
}

/// Line-start `A.` style markers that belong to a lettered run: the next
/// marker continues the alphabet or the previous one precedes it. A lone
/// initial such as `A. Smith` is not a marker.
fn letter_marker_positions(text: &str) -> Vec<usize> {
    let found: Vec<(usize, u8)> = letter_marker_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str().as_bytes()[0]))
        .collect();

    found
        .iter()
        .enumerate()
        .filter(|&(i, &(_, letter))| {
            let follows = i
                .checked_sub(1)
                .and_then(|j| found.get(j))
                .is_some_and(|&(_, prev)| prev + 1 == letter);
            let continued = found
                .get(i + 1)
                .is_some_and(|&(_, next)| next == letter + 1);
            follows || continued
        })
        .map(|(_, &(pos, _))| pos)
        .collect()
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("paragraph regex"))
}

fn recital_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:WHEREAS\b|NOW,?\s+THEREFORE\b|IN WITNESS WHEREOF\b)")
            .expect("recital regex")
    })
}

/// Numbering only counts at text start, line start, or after sentence punctuation.
fn is_marker_position(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    let stripped = before.trim_end_matches([' ', '\t']);
    if stripped.is_empty() || stripped.ends_with('\n') {
        return true;
    }
    if stripped.len() == before.len() {
        // no whitespace between the previous token and the marker
        return false;
    }
    stripped.ends_with(['.', '!', '?', ';', ':'])
}

pub struct ClauseSegmenter {
    config: SegmentationConfig,
}

impl Default for ClauseSegmenter {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}

impl ClauseSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Ordered clause spans covering the text.
    pub fn segment(&self, text: &str) -> Vec<ClauseSpan> {
        self.segment_with_strategy(text).1
    }

    /// Clause spans plus the tier that produced them.
    pub fn segment_with_strategy(&self, text: &str) -> (SegmentationStrategy, Vec<ClauseSpan>) {
        if text.trim().is_empty() {
            return (SegmentationStrategy::Empty, Vec::new());
        }

        for tier in STRUCTURAL_TIERS {
            let boundaries = self.boundaries(tier, text);
            if boundaries.iter().any(|&b| b > 0) {
                let spans = spans_from_boundaries(text, &boundaries);
                let merged = self.merge_short(text, spans);
                debug!(
                    "[segmenter] tier={:?} boundaries={} clauses={}",
                    tier,
                    boundaries.len(),
                    merged.len()
                );
                return (tier, merged);
            }
        }

        let grouped = self.group_sentences(text);
        if grouped.len() > 1 {
            let merged = self.merge_short(text, grouped);
            debug!("[segmenter] tier=Sentences clauses={}", merged.len());
            return (SegmentationStrategy::Sentences, merged);
        }

        let whole = ClauseSpan::trimmed(text, 0, text.len()).into_iter().collect();
        (SegmentationStrategy::Whole, whole)
    }

    fn boundaries(&self, tier: SegmentationStrategy, text: &str) -> Vec<usize> {
        let mut found: Vec<usize> = match tier {
            SegmentationStrategy::Numbered => numbering_re()
                .find_iter(text)
                .map(|m| m.start())
                .chain(letter_marker_positions(text))
                .filter(|&pos| is_marker_position(text, pos))
                .collect(),
            SegmentationStrategy::Headings => self.heading_boundaries(text),
            SegmentationStrategy::Paragraphs => paragraph_break_re()
                .find_iter(text)
                .map(|m| m.end())
                .filter(|&pos| pos < text.len())
                .collect(),
            _ => Vec::new(),
        };
        found.sort_unstable();
        found.dedup();
        found
    }

    fn heading_boundaries(&self, text: &str) -> Vec<usize> {
        let mut out: Vec<usize> = recital_re().find_iter(text).map(|m| m.start()).collect();
        let mut offset = 0usize;
        for line in text.split('\n') {
            if self.is_heading_line(line) {
                out.push(offset + (line.len() - line.trim_start().len()));
            }
            offset += line.len() + 1;
        }
        out
    }

    fn is_heading_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().count() > self.config.heading_max_chars {
            return false;
        }
        if trimmed.split_whitespace().count() > self.config.heading_max_words {
            return false;
        }
        let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
        letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
    }

    fn group_sentences(&self, text: &str) -> Vec<ClauseSpan> {
        let target = self.config.sentence_target_chars;
        let max = self.config.sentence_max_chars.max(target);
        let min = self.config.min_clause_chars;

        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for sentence in split_sentences_advanced(text) {
            current = match current {
                None => Some((sentence.start, sentence.end)),
                Some((start, end)) => {
                    let combined = text[start..sentence.end].chars().count();
                    let current_len = text[start..end].chars().count();
                    let limit = if current_len < min { max } else { target };
                    if combined <= limit {
                        Some((start, sentence.end))
                    } else {
                        groups.push((start, end));
                        Some((sentence.start, sentence.end))
                    }
                }
            };
        }
        if let Some(last) = current {
            groups.push(last);
        }

        groups
            .into_iter()
            .filter_map(|(start, end)| ClauseSpan::trimmed(text, start, end))
            .collect()
    }

    /// Fold clauses below the minimum length into their successor, or the
    /// predecessor when the short clause is last.
    fn merge_short(&self, text: &str, spans: Vec<ClauseSpan>) -> Vec<ClauseSpan> {
        let min = self.config.min_clause_chars;
        let mut merged: Vec<ClauseSpan> = Vec::with_capacity(spans.len());
        let mut pending: Option<usize> = None;
        let mut last_end = 0usize;

        for span in spans {
            let start = pending.take().unwrap_or(span.start);
            last_end = span.end;
            let Some(candidate) = ClauseSpan::trimmed(text, start, span.end) else {
                continue;
            };
            if candidate.char_len() < min {
                pending = Some(candidate.start);
                continue;
            }
            merged.push(candidate);
        }

        if let Some(start) = pending {
            match merged.last_mut() {
                Some(prev) => {
                    if let Some(extended) = ClauseSpan::trimmed(text, prev.start, last_end) {
                        *prev = extended;
                    }
                }
                None => merged.extend(ClauseSpan::trimmed(text, start, last_end)),
            }
        }

        merged
    }
}

fn spans_from_boundaries(text: &str, boundaries: &[usize]) -> Vec<ClauseSpan> {
    let mut cuts: Vec<usize> = Vec::with_capacity(boundaries.len() + 2);
    if boundaries.first() != Some(&0) {
        cuts.push(0);
    }
    cuts.extend_from_slice(boundaries);
    cuts.push(text.len());

    cuts.windows(2)
        .filter_map(|w| ClauseSpan::trimmed(text, w[0], w[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(spans: &[ClauseSpan]) -> Vec<&str> {
        spans.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_inline_numbering_after_sentence_end() {
        let text = "1. Liability: Vendor shall have unlimited liability for all damages. 2. This agreement may be terminated at will.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_eq!(strategy, SegmentationStrategy::Numbered);
        assert_eq!(
            texts(&spans),
            vec![
                "1. Liability: Vendor shall have unlimited liability for all damages.",
                "2. This agreement may be terminated at will.",
            ]
        );
        for span in &spans {
            assert_eq!(&text[span.start..span.end], span.text);
        }
    }

    #[test]
    fn test_numbering_mid_sentence_is_not_a_boundary() {
        let text = "Payment is due within 30 days as set out in Section 4 of the schedule and clause 2 of the order.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_eq!(strategy, SegmentationStrategy::Whole);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_nested_and_lettered_markers() {
        let text = "2.1 The Supplier shall deliver the goods on time.\n(a) Delivery shall be made to the Buyer's premises.\n(iv) Risk passes to the Buyer upon delivery of goods.\nSection 3: Fees are payable within thirty days of invoice.";
        let spans = ClauseSegmenter::default().segment(text);
        assert_eq!(spans.len(), 4);
        assert!(spans[1].text.starts_with("(a)"));
        assert!(spans[2].text.starts_with("(iv)"));
        assert!(spans[3].text.starts_with("Section 3"));
    }

    #[test]
    fn test_lettered_run_splits() {
        let text = "The Buyer's duties are as follows.\nA. Pay each invoice within thirty days of receipt.\nB. Inspect the goods promptly after each delivery.\nC. Report any defect in writing without delay.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_eq!(strategy, SegmentationStrategy::Numbered);
        assert_eq!(spans.len(), 4);
        assert!(spans[1].text.starts_with("A. Pay"));
        assert!(spans[3].text.starts_with("C. Report"));
    }

    #[test]
    fn test_initial_at_line_start_is_not_a_marker() {
        let text = "The deliverables are listed in the schedule and follow here.\nA. Smith shall deliver the signed copies to the registered office.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_ne!(strategy, SegmentationStrategy::Numbered);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, text);
    }

    #[test]
    fn test_heading_lines() {
        let text = "CONFIDENTIALITY\nEach party shall keep the other party's information confidential.\nTERMINATION\nEither party may terminate this agreement on thirty days notice.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_eq!(strategy, SegmentationStrategy::Headings);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].text.starts_with("CONFIDENTIALITY\nEach party"));
        assert!(spans[1].text.starts_with("TERMINATION"));
    }

    #[test]
    fn test_paragraph_fallback() {
        let text = "The parties agree to cooperate in good faith on all matters.\n\nThe buyer shall pay the fees set out in the order form.";
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy(text);
        assert_eq!(strategy, SegmentationStrategy::Paragraphs);
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_sentence_grouping_respects_target() {
        let sentence = "The licensee shall use the software only for internal business purposes. ";
        let text = sentence.repeat(10);
        let config = SegmentationConfig {
            sentence_target_chars: 160,
            ..SegmentationConfig::default()
        };
        let (strategy, spans) = ClauseSegmenter::new(config).segment_with_strategy(text.trim());
        assert_eq!(strategy, SegmentationStrategy::Sentences);
        assert_eq!(spans.len(), 5);
        for span in &spans {
            assert!(span.text.chars().count() <= 160);
            assert!(span.text.ends_with('.'));
        }
    }

    #[test]
    fn test_short_clauses_merge_forward_and_last_backward() {
        let text = "1. Fees.\n2. The buyer shall pay all fees within thirty days.\n3. Notices.";
        let spans = ClauseSegmenter::default().segment(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, text);
    }

    #[test]
    fn test_short_whole_text_is_still_one_clause() {
        let spans = ClauseSegmenter::default().segment("Void.");
        assert_eq!(texts(&spans), vec!["Void."]);
    }

    #[test]
    fn test_empty_text() {
        let (strategy, spans) = ClauseSegmenter::default().segment_with_strategy("   ");
        assert_eq!(strategy, SegmentationStrategy::Empty);
        assert!(spans.is_empty());
    }

    fn clause_body() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                Just("the"),
                Just("tenant"),
                Just("landlord"),
                Just("shall"),
                Just("pay"),
                Just("rent"),
                Just("within"),
                Just("thirty"),
                Just("days"),
                Just("of"),
                Just("written"),
                Just("notice"),
            ],
            3..14,
        )
        .prop_map(|words| format!("{}.", words.join(" ")))
    }

    proptest! {
        #[test]
        fn prop_spans_are_ordered_slices(text in "[A-Za-z0-9 .;:()\n]{0,400}") {
            let segmenter = ClauseSegmenter::default();
            let spans = segmenter.segment(&text);
            let mut prev_end = 0usize;
            for span in &spans {
                prop_assert!(span.start >= prev_end);
                prop_assert!(span.start < span.end);
                prop_assert_eq!(&text[span.start..span.end], span.text.as_str());
                prev_end = span.end;
            }
            let kept: String = spans.iter().flat_map(|s| s.text.chars()).filter(|c| !c.is_whitespace()).collect();
            let all: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            prop_assert_eq!(kept, all);
        }

        #[test]
        fn prop_structural_boundaries_survive_reflow(
            bodies in proptest::collection::vec(clause_body(), 1..8),
            numbered in any::<bool>(),
            sep in prop_oneof![Just(" "), Just("\n"), Just("\n\n")],
        ) {
            let text = if numbered {
                bodies
                    .iter()
                    .enumerate()
                    .map(|(i, body)| format!("{}. {}", i + 1, body))
                    .collect::<Vec<_>>()
                    .join(sep)
            } else {
                bodies.join("\n\n")
            };
            let segmenter = ClauseSegmenter::default();
            let (strategy, first) = segmenter.segment_with_strategy(&text);
            if bodies.len() > 1 {
                let expected = if numbered {
                    SegmentationStrategy::Numbered
                } else {
                    SegmentationStrategy::Paragraphs
                };
                prop_assert_eq!(strategy, expected);
            }

            // the same clauses laid out as blank-line separated paragraphs
            let reflowed = texts(&first).join("\n\n");
            let (again_strategy, again) = segmenter.segment_with_strategy(&reflowed);
            prop_assert_eq!(again_strategy, strategy);
            prop_assert_eq!(texts(&again), texts(&first));
        }
    }
}
