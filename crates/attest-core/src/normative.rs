//! Text patterns for normative language, sentences, and verbatim quotes.
//!
//! Everything the extractor and reviewer need to reason about raw source
//! text lives here: which sentences are eligible for extraction, where
//! sentence boundaries fall, and how a model-proposed quote is located back
//! in the chunk it claims to come from.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

/// Shortest quote kept, unless the whole sentence is shorter.
pub const MIN_QUOTE_WORDS: usize = 10;

/// Longest quote kept; longer quotes are excerpted.
pub const MAX_QUOTE_WORDS: usize = 40;

lazy_static! {
    /// Normative terms that make a sentence eligible for extraction.
    pub static ref NORMATIVE_PATTERN: Regex = Regex::new(
        r"(?i)\b(must|shall|required|prohibited|mandated)\b"
    ).unwrap();

    static ref WORD_PATTERN: Regex = Regex::new(r"\S+").unwrap();
}

/// Abbreviations common in statutes and manuals that end in a period
/// without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "sec.", "secs.", "no.", "nos.", "art.", "ch.", "subd.", "subds.", "para.", "e.g.", "i.e.",
    "u.s.", "u.s.c.", "c.f.r.", "cal.", "stat.", "v.", "vs.", "mr.", "ms.", "dr.", "st.",
];

/// Check if text contains any normative term.
pub fn contains_normative(text: &str) -> bool {
    NORMATIVE_PATTERN.is_match(text)
}

/// Byte offset of the first normative term, if any.
pub fn first_normative_offset(text: &str) -> Option<usize> {
    NORMATIVE_PATTERN.find(text).map(|m| m.start())
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Byte ranges of whitespace-separated words.
pub fn word_spans(text: &str) -> Vec<Range<usize>> {
    WORD_PATTERN.find_iter(text).map(|m| m.range()).collect()
}

/// Split text into sentence byte ranges (trimmed, never empty).
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or end of text,
/// or at a blank line. Periods that close a known abbreviation or a single
/// capital initial do not end a sentence.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '.' | '!' | '?' => {
                let followed_by_space = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
                followed_by_space && !(c == '.' && ends_with_abbreviation(&text[start..end]))
            }
            '\n' => chars.peek().map_or(false, |(_, next)| *next == '\n'),
            _ => false,
        };

        if boundary {
            push_trimmed(&mut spans, text, start..end);
            start = end;
        }
    }
    push_trimmed(&mut spans, text, start..text.len());

    spans
}

/// Sentence spans that contain a normative term.
pub fn normative_sentences(text: &str) -> Vec<Range<usize>> {
    sentence_spans(text)
        .into_iter()
        .filter(|span| contains_normative(&text[span.clone()]))
        .collect()
}

/// Locate a quote in `haystack`, ignoring whitespace differences.
///
/// Returns the byte range of the verbatim match. Matching is case-sensitive:
/// a quote that changes capitalisation is not verbatim.
pub fn locate_quote(haystack: &str, quote: &str) -> Option<Range<usize>> {
    let words: Vec<String> = quote.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    let pattern = Regex::new(&words.join(r"\s+")).ok()?;
    pattern.find(haystack).map(|m| m.range())
}

/// Narrow `span` of `text` to at most `max_words` words, keeping the word
/// at `anchor` (a byte offset inside `span`) in the window.
///
/// The window starts a few words before the anchor so the excerpt keeps the
/// subject of the normative clause.
pub fn excerpt_span(text: &str, span: Range<usize>, max_words: usize, anchor: usize) -> Range<usize> {
    let words = word_spans(&text[span.clone()]);
    if words.len() <= max_words || max_words == 0 {
        return span;
    }

    let relative = anchor.saturating_sub(span.start);
    let anchor_word = words
        .iter()
        .position(|w| w.end > relative)
        .unwrap_or(0);

    let lead = max_words / 4;
    let first = anchor_word
        .saturating_sub(lead)
        .min(words.len() - max_words);
    let last = first + max_words - 1;

    (span.start + words[first].start)..(span.start + words[last].end)
}

/// Fit a located quote to the 10-40 word bounds.
///
/// Short quotes widen to their enclosing sentence(s); a sentence that is
/// itself shorter than the minimum is kept whole. Long quotes are excerpted
/// around their first normative term.
pub fn fit_quote_span(text: &str, span: Range<usize>) -> Range<usize> {
    let mut fitted = span.clone();

    if word_count(&text[fitted.clone()]) < MIN_QUOTE_WORDS {
        let enclosing: Vec<Range<usize>> = sentence_spans(text)
            .into_iter()
            .filter(|s| s.start < span.end && span.start < s.end)
            .collect();
        if let (Some(first), Some(last)) = (enclosing.first(), enclosing.last()) {
            fitted = first.start.min(span.start)..last.end.max(span.end);
        }
    }

    if word_count(&text[fitted.clone()]) > MAX_QUOTE_WORDS {
        let anchor = first_normative_offset(&text[span.clone()])
            .map(|offset| span.start + offset)
            .unwrap_or(span.start);
        fitted = excerpt_span(text, fitted, MAX_QUOTE_WORDS, anchor);
    }

    fitted
}

fn ends_with_abbreviation(segment: &str) -> bool {
    let token = segment
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| c == '(' || c == '"');
    let lower = token.to_lowercase();

    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }

    // Single capital initial, e.g. "John Q. Public"
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_ascii_uppercase()
    )
}

fn push_trimmed(spans: &mut Vec<Range<usize>>, text: &str, range: Range<usize>) {
    let slice = &text[range.clone()];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed_end = slice.len() - slice.trim_end().len();
    if trimmed_start + trimmed_end < slice.len() {
        spans.push((range.start + trimmed_start)..(range.end - trimmed_end));
    }
}
