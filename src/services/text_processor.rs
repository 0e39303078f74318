// Text Processing Service
// Canonicalizes extracted contract text and splits it into sentences

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const SENTENCE_END: [char; 5] = ['.', '!', '?', ';', ':'];

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "inc", "ltd", "llc", "llp", "co", "corp", "no", "nos", "sec", "art", "cl", "para", "e.g",
    "i.e", "etc", "vs", "v", "mr", "mrs", "ms", "dr", "st", "u.s", "u.k", "approx", "incl",
];

fn page_artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:-\s*)?(?:page\s+\d{1,4}(?:\s*(?:of|/)\s*\d{1,4})?|\d{1,4})(?:\s*-)?$")
            .expect("page artifact regex")
    })
}

fn horizontal_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x0B]+").expect("whitespace regex"))
}

/// Map a single character to its canonical form, or drop it.
fn canonical_char(ch: char) -> Option<char> {
    match ch {
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{00ab}' | '\u{00bb}' => Some('"'),
        '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => Some('\''),
        '\u{2013}' | '\u{2014}' | '\u{2012}' | '\u{2212}' => Some('-'),
        '\u{00a0}' | '\u{3000}' | '\u{2002}'..='\u{200a}' | '\u{202f}' => Some(' '),
        '\u{2026}' => Some('.'),
        // form feed is a page break in most extractors
        '\x0C' => Some('\n'),
        '\u{fffd}' | '\u{feff}' | '\u{200b}' | '\u{00ad}' => None,
        '\n' | '\t' => Some(ch),
        c if c.is_control() => None,
        c => Some(c),
    }
}

fn ends_sentence(line: &str) -> bool {
    line.trim_end()
        .chars()
        .last()
        .map(|c| SENTENCE_END.contains(&c) || c == '"' || c == ')')
        .unwrap_or(false)
}

fn starts_lowercase(line: &str) -> bool {
    line.chars().next().map(|c| c.is_lowercase()).unwrap_or(false)
}

/// Hyphenated word broken across lines, e.g. `termi-` followed by `nation`.
fn is_hyphen_break(current: &str, next: &str) -> bool {
    let mut rev = current.chars().rev();
    matches!(rev.next(), Some('-'))
        && rev.next().map(|c| c.is_alphabetic()).unwrap_or(false)
        && starts_lowercase(next)
}

/// Clean raw extracted text into the canonical form every later stage works on.
///
/// The result is stable under re-application.
pub fn normalize_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = unified.chars().filter_map(canonical_char).collect();

    let lines = cleaned
        .split('\n')
        .map(|ln| horizontal_ws_re().replace_all(ln, " ").trim().to_string())
        .filter(|ln| !page_artifact_re().is_match(ln));

    let mut joined: Vec<String> = Vec::new();
    for line in lines {
        if line.is_empty() {
            if joined.last().map(|l| !l.is_empty()).unwrap_or(false) {
                joined.push(String::new());
            }
            continue;
        }
        match joined.last_mut() {
            Some(current) if !current.is_empty() && is_hyphen_break(current, &line) => {
                current.pop();
                current.push_str(&line);
            }
            Some(current)
                if !current.is_empty() && !ends_sentence(current) && starts_lowercase(&line) =>
            {
                current.push(' ');
                current.push_str(&line);
            }
            _ => joined.push(line),
        }
    }

    while joined.last().map(|l| l.is_empty()).unwrap_or(false) {
        joined.pop();
    }

    joined.join("\n").trim().to_string()
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceOffset {
    pub text: String,
    /// Byte offset of the first non-space character.
    pub start: usize,
    /// Byte offset one past the last non-space character.
    pub end: usize,
}

fn is_abbreviation(text: &str, dot_at: usize) -> bool {
    let before = &text[..dot_at];
    let word: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '.')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if word.is_empty() {
        return false;
    }
    let lower = word.to_lowercase();
    // single capital initial such as "J." in "J. Smith"
    if word.chars().count() == 1 && word.chars().all(|c| c.is_uppercase()) {
        return true;
    }
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Split text into sentences with byte offsets.
///
/// Sentence ends are `.`, `!` and `?` followed by whitespace or end of text,
/// plus line breaks. Decimals (`2.5`), abbreviations (`Inc.`) and quoted
/// text do not end a sentence.
pub fn split_sentences_advanced(text: &str) -> Vec<SentenceOffset> {
    let mut sentences = Vec::new();
    if text.trim().is_empty() {
        return sentences;
    }

    let push = |start: usize, end: usize, out: &mut Vec<SentenceOffset>| {
        let slice = &text[start..end];
        let lead = slice.len() - slice.trim_start().len();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            out.push(SentenceOffset {
                text: trimmed.to_string(),
                start: start + lead,
                end: start + lead + trimmed.len(),
            });
        }
    };

    let mut current_start = 0usize;
    let mut in_quote = false;
    let mut iter = text.char_indices().peekable();

    while let Some((i, ch)) = iter.next() {
        if ch == '"' {
            in_quote = !in_quote;
            continue;
        }
        if ch == '\n' {
            push(current_start, i, &mut sentences);
            current_start = i + 1;
            in_quote = false;
            continue;
        }
        if !matches!(ch, '.' | '!' | '?') || in_quote {
            continue;
        }

        let next = iter.peek().map(|&(_, c)| c);
        let at_boundary = match next {
            None => true,
            Some(c) => c.is_whitespace(),
        };
        if !at_boundary {
            continue;
        }
        if ch == '.' && is_abbreviation(text, i) {
            continue;
        }

        let end = i + ch.len_utf8();
        push(current_start, end, &mut sentences);
        current_start = end;
    }

    if current_start < text.len() {
        push(current_start, text.len(), &mut sentences);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_quotes_and_spaces() {
        let raw = "\u{201c}Vendor\u{201d}\u{00a0}shall  pay\u{2014}promptly.";
        assert_eq!(normalize_text(raw), "\"Vendor\" shall pay-promptly.");
    }

    #[test]
    fn test_normalize_drops_page_numbers() {
        let raw = "1. Term.\nPage 3 of 10\n2. Fees.\n\n12\n\n3. Notices.";
        let out = normalize_text(raw);
        assert!(!out.contains("Page 3"));
        assert!(!out.contains("12"));
        assert!(out.contains("1. Term.\n2. Fees."));
    }

    #[test]
    fn test_normalize_joins_hyphenated_and_wrapped_lines() {
        let raw = "This agreement may be termi-\nnated by either party\nupon notice.";
        assert_eq!(
            normalize_text(raw),
            "This agreement may be terminated by either party upon notice."
        );
    }

    #[test]
    fn test_normalize_keeps_line_after_sentence_end() {
        let raw = "Fees are due monthly.\nlate fees apply.";
        assert_eq!(normalize_text(raw), "Fees are due monthly.\nlate fees apply.");
    }

    #[test]
    fn test_normalize_collapses_blank_lines_and_controls() {
        let raw = "\r\nA.\r\n\r\n\r\n\r\nB\u{fffd}.\u{0007}\n\n";
        assert_eq!(normalize_text(raw), "A.\n\nB.");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n\t \r\n"), "");
    }

    #[test]
    fn test_normalize_idempotent_on_sample() {
        let raw = "ARTICLE 1\u{00a0}DEFINITIONS\n\n1.1 \u{201c}Party\u{201d} means\neach signatory.\n- 2 -\n1.2 Fees are non-\nrefundable.";
        let once = normalize_text(raw);
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn test_split_sentences_offsets() {
        let text = "Vendor shall pay. Buyer may cancel!  Done?";
        let sentences = split_sentences_advanced(text);
        assert_eq!(sentences.len(), 3);
        for s in &sentences {
            assert_eq!(&text[s.start..s.end], s.text);
        }
        assert_eq!(sentences[1].text, "Buyer may cancel!");
    }

    #[test]
    fn test_split_sentences_skips_decimals_and_abbreviations() {
        let text = "Acme Inc. shall pay 2.5 percent interest. Late fees apply.";
        let sentences = split_sentences_advanced(text);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].text.starts_with("Acme Inc. shall"));
    }

    #[test]
    fn test_split_sentences_respects_quotes() {
        let text = "The term \"Services. Goods.\" is defined here. Next.";
        let sentences = split_sentences_advanced(text);
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree "), 3);
        assert_eq!(word_count(""), 0);
    }
}
