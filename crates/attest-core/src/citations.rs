//! Inline `[REQ-ID]` citation markers and the grounding check.
//!
//! An answer is grounded when every sentence carries at least one marker and
//! every marker names a verified requirement.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normative::{contains_normative, sentence_spans, word_count};

/// `[REQ-S001]` or grouped `[REQ-S001, REQ-P002]`.
const MARKER: &str = r"\[\s*(REQ-[A-Z]+\d+(?:\s*[,;]\s*REQ-[A-Z]+\d+)*)\s*\]";

/// Longest list lead-in that may go uncited.
const MAX_LEAD_IN_WORDS: usize = 6;

lazy_static! {
    static ref MARKER_PATTERN: Regex = Regex::new(MARKER).unwrap();

    /// Markers opening a sentence, as in "... by March 1. [REQ-S001] Late ..."
    static ref LEADING_MARKERS: Regex = Regex::new(&format!(r"^(?:\s*{})+\s*", MARKER)).unwrap();
}

/// Requirement IDs cited in `text`, deduplicated, in order of first appearance.
pub fn cited_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for captures in MARKER_PATTERN.captures_iter(text) {
        for id in captures[1].split([',', ';']) {
            let id = id.trim();
            if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Strip all citation markers from `text`.
pub fn strip_markers(text: &str) -> String {
    MARKER_PATTERN.replace_all(text, "").into_owned()
}

/// Whether `text` is nothing but markers and punctuation.
fn is_marker_only(text: &str) -> bool {
    !strip_markers(text).chars().any(|c| c.is_alphanumeric())
}

/// One sentence of an answer and the requirements it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSentence {
    pub text: String,
    pub citations: Vec<String>,
}

impl AnswerSentence {
    /// A short line such as "The county's duties are:" that introduces a
    /// list and asserts nothing itself.
    fn is_lead_in(&self) -> bool {
        let bare = strip_markers(&self.text);
        bare.trim_end().ends_with(':')
            && !contains_normative(&bare)
            && word_count(&bare) <= MAX_LEAD_IN_WORDS
    }

    fn absorb(&mut self, citations: Vec<String>) {
        for id in citations {
            if !self.citations.contains(&id) {
                self.citations.push(id);
            }
        }
    }
}

/// Split an answer into sentences for citation checking.
///
/// Each line is split separately so list items are judged on their own.
/// Markers written after a sentence's closing period ("... by March 1.
/// [REQ-S001]") belong to that sentence, whether they end the line or open
/// the next sentence on it.
pub fn answer_sentences(answer: &str) -> Vec<AnswerSentence> {
    let mut sentences: Vec<AnswerSentence> = Vec::new();

    for line in answer.lines() {
        for (index, span) in sentence_spans(line).into_iter().enumerate() {
            let mut text = &line[span];

            if is_marker_only(text) {
                if let Some(previous) = sentences.last_mut() {
                    previous.absorb(cited_ids(text));
                }
                continue;
            }

            if index > 0 {
                if let Some(leading) = LEADING_MARKERS.find(text) {
                    if let Some(previous) = sentences.last_mut() {
                        previous.absorb(cited_ids(leading.as_str()));
                    }
                    text = &text[leading.end()..];
                }
            }

            sentences.push(AnswerSentence {
                text: text.to_string(),
                citations: cited_ids(text),
            });
        }
    }

    sentences
}

/// Result of checking an answer's citations against the verified set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroundingReport {
    /// Sentences without any `[REQ-ID]`
    pub uncited_sentences: Vec<String>,

    /// IDs cited but absent from the verified set
    pub unknown_citations: Vec<String>,

    /// The answer had no text at all
    #[serde(default)]
    pub empty_answer: bool,
}

impl GroundingReport {
    pub fn is_grounded(&self) -> bool {
        !self.empty_answer && self.uncited_sentences.is_empty() && self.unknown_citations.is_empty()
    }

    /// Human-readable violations, suitable as reviewer issues.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.empty_answer {
            violations.push("Answer is empty".to_string());
        }
        for sentence in &self.uncited_sentences {
            violations.push(format!("Sentence has no citation: \"{}\"", preview(sentence, 80)));
        }
        for id in &self.unknown_citations {
            violations.push(format!("Cites {} which is not a verified requirement", id));
        }
        violations
    }
}

/// Check that every sentence is cited and every citation is verified.
pub fn check_grounding(answer: &str, verified_ids: &[String]) -> GroundingReport {
    if answer.trim().is_empty() {
        return GroundingReport {
            empty_answer: true,
            ..Default::default()
        };
    }

    let sentences = answer_sentences(answer);
    let uncited_sentences = sentences
        .iter()
        .enumerate()
        .filter(|(i, s)| {
            let introduces_cited_item = s.is_lead_in()
                && sentences.get(i + 1).is_some_and(|next| !next.citations.is_empty());
            s.citations.is_empty() && !introduces_cited_item
        })
        .map(|(_, s)| s.text.clone())
        .collect();

    let unknown_citations = cited_ids(answer)
        .into_iter()
        .filter(|id| !verified_ids.contains(id))
        .collect();

    GroundingReport {
        uncited_sentences,
        unknown_citations,
        empty_answer: false,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
