//! Deterministic assembly of extracted requirements.
//!
//! The model proposes candidate quotes; this module decides which survive
//! and what they are called. A candidate is kept only if it can be found
//! verbatim in the chunk it names and carries normative language. IDs are
//! assigned after sorting by chunk position and quote offset, so two runs
//! over the same chunks produce the same IDs no matter how the model
//! ordered or worded its candidates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

use crate::normative::{contains_normative, fit_quote_span, locate_quote, normative_sentences};
use crate::types::{Chunk, ExtractedRequirement, ExtractionConfidence, SourceType};

/// A quote proposed by the extraction model, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementCandidate {
    pub chunk_id: String,
    pub exact_quote: String,
    #[serde(default)]
    pub confidence: ExtractionConfidence,
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Names a chunk that was not retrieved
    UnknownChunk,
    /// Not a substring of the chunk, modulo whitespace
    NotVerbatim,
    /// No must/shall/required/prohibited/mandated
    NotNormative,
    /// Overlaps a quote already kept from the same chunk
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscardedCandidate {
    pub chunk_id: String,
    pub reason: DiscardReason,
}

/// Requirements that survived validation, plus what was dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionReport {
    pub requirements: Vec<ExtractedRequirement>,
    pub discarded: Vec<DiscardedCandidate>,
}

/// Hands out `REQ-S001`, `REQ-P001`, ... with a counter per source type.
#[derive(Debug, Default)]
pub struct RequirementIdAllocator {
    statute: u32,
    policy: u32,
}

impl RequirementIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, source_type: SourceType) -> String {
        let counter = match source_type {
            SourceType::Statute => &mut self.statute,
            SourceType::Policy => &mut self.policy,
        };
        *counter += 1;
        format!("REQ-{}{:03}", source_type.prefix(), counter)
    }
}

/// Chunks with at least one normative sentence; only these go to the model.
pub fn eligible_chunks(chunks: &[Chunk]) -> Vec<&Chunk> {
    chunks
        .iter()
        .filter(|c| !normative_sentences(&c.text).is_empty())
        .collect()
}

struct LocatedQuote {
    chunk_index: usize,
    span: Range<usize>,
    confidence: ExtractionConfidence,
}

/// Validate candidates against the chunks and assign requirement IDs.
///
/// `chunks` must be in retrieval order; that order (then the quote's byte
/// offset inside its chunk) fixes the ID sequence.
pub fn assemble_requirements(
    chunks: &[Chunk],
    candidates: Vec<RequirementCandidate>,
) -> ExtractionReport {
    let positions: HashMap<&str, usize> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (c.chunk_id.as_str(), i))
        .collect();

    let mut located: Vec<LocatedQuote> = Vec::new();
    let mut discarded = Vec::new();

    for candidate in candidates {
        let mut discard = |reason: DiscardReason| {
            tracing::debug!(chunk_id = %candidate.chunk_id, reason = ?reason, "Discarding extraction candidate");
            discarded.push(DiscardedCandidate {
                chunk_id: candidate.chunk_id.clone(),
                reason,
            });
        };

        let Some(&chunk_index) = positions.get(candidate.chunk_id.trim()) else {
            discard(DiscardReason::UnknownChunk);
            continue;
        };
        let text = &chunks[chunk_index].text;

        let Some(span) = locate_quote(text, &candidate.exact_quote) else {
            discard(DiscardReason::NotVerbatim);
            continue;
        };
        let span = fit_quote_span(text, span);

        if !contains_normative(&text[span.clone()]) {
            discard(DiscardReason::NotNormative);
            continue;
        }

        let overlaps = located
            .iter()
            .any(|l| l.chunk_index == chunk_index && l.span.start < span.end && span.start < l.span.end);
        if overlaps {
            discard(DiscardReason::Duplicate);
            continue;
        }

        located.push(LocatedQuote {
            chunk_index,
            span,
            confidence: candidate.confidence,
        });
    }

    located.sort_by_key(|l| (l.chunk_index, l.span.start));

    let mut ids = RequirementIdAllocator::new();
    let requirements = located
        .into_iter()
        .map(|l| {
            let chunk = &chunks[l.chunk_index];
            ExtractedRequirement {
                requirement_id: ids.next_id(chunk.source_type),
                source_type: chunk.source_type,
                document_id: chunk.document_id.clone(),
                section_heading: chunk.section_heading.clone(),
                exact_quote: chunk.text[l.span].to_string(),
                chunk_id: chunk.chunk_id.clone(),
                extraction_confidence: l.confidence,
            }
        })
        .collect();

    ExtractionReport {
        requirements,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normative::{normalize_whitespace, word_count, MAX_QUOTE_WORDS};
    use proptest::prelude::*;

    fn chunk(id: &str, source_type: SourceType, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            source_type,
            document_id: format!("DOC-{}", id),
            section_heading: "General".to_string(),
            text: text.to_string(),
            similarity_score: 0.9,
        }
    }

    fn candidate(chunk_id: &str, quote: &str) -> RequirementCandidate {
        RequirementCandidate {
            chunk_id: chunk_id.to_string(),
            exact_quote: quote.to_string(),
            confidence: ExtractionConfidence::High,
        }
    }

    #[test]
    fn test_allocator_scopes_by_source_type() {
        let mut ids = RequirementIdAllocator::new();
        assert_eq!(ids.next_id(SourceType::Statute), "REQ-S001");
        assert_eq!(ids.next_id(SourceType::Policy), "REQ-P001");
        assert_eq!(ids.next_id(SourceType::Statute), "REQ-S002");
    }

    #[test]
    fn test_single_statute_sentence() {
        let chunks = vec![chunk("S1", SourceType::Statute, "Counties shall submit annual reports by March 1.")];
        let report = assemble_requirements(
            &chunks,
            vec![candidate("S1", "Counties shall submit annual reports by March 1")],
        );

        assert_eq!(report.requirements.len(), 1);
        let req = &report.requirements[0];
        assert_eq!(req.requirement_id, "REQ-S001");
        assert_eq!(req.chunk_id, "S1");
        assert_eq!(req.exact_quote, "Counties shall submit annual reports by March 1.");
        assert!(report.discarded.is_empty());
    }

    #[test]
    fn test_paraphrase_is_discarded() {
        let chunks = vec![chunk("S1", SourceType::Statute, "Counties shall submit annual reports by March 1.")];
        let report = assemble_requirements(
            &chunks,
            vec![candidate("S1", "Counties need to report every year by March")],
        );

        assert!(report.requirements.is_empty());
        assert_eq!(report.discarded[0].reason, DiscardReason::NotVerbatim);
    }

    #[test]
    fn test_unknown_chunk_is_discarded() {
        let chunks = vec![chunk("S1", SourceType::Statute, "Counties shall submit annual reports by March 1.")];
        let report = assemble_requirements(&chunks, vec![candidate("S9", "Counties shall submit")]);

        assert!(report.requirements.is_empty());
        assert_eq!(report.discarded[0].reason, DiscardReason::UnknownChunk);
    }

    #[test]
    fn test_non_normative_quote_is_discarded() {
        let chunks = vec![chunk(
            "P1",
            SourceType::Policy,
            "The program was created in 1998 to support rural counties and their residents.",
        )];
        let report = assemble_requirements(
            &chunks,
            vec![candidate("P1", "The program was created in 1998 to support rural counties")],
        );

        assert!(report.requirements.is_empty());
        assert_eq!(report.discarded[0].reason, DiscardReason::NotNormative);
    }

    #[test]
    fn test_overlapping_quotes_deduplicated() {
        let text = "Each county shall submit an annual report to the department by March 1 of each year.";
        let chunks = vec![chunk("S1", SourceType::Statute, text)];
        let report = assemble_requirements(
            &chunks,
            vec![
                candidate("S1", "Each county shall submit an annual report to the department"),
                candidate("S1", "shall submit an annual report"),
            ],
        );

        assert_eq!(report.requirements.len(), 1);
        assert_eq!(report.discarded[0].reason, DiscardReason::Duplicate);
    }

    #[test]
    fn test_ids_follow_chunk_then_offset_order() {
        let chunks = vec![
            chunk("S1", SourceType::Statute, "The clerk shall file the notice within ten days of receipt. The board must approve the budget before the fiscal year begins."),
            chunk("P1", SourceType::Policy, "Staff must verify applicant identity before any benefits are issued to the household."),
            chunk("S2", SourceType::Statute, "A county is prohibited from charging fees for filing an initial application."),
        ];

        // Model returned candidates in scrambled order
        let report = assemble_requirements(
            &chunks,
            vec![
                candidate("S2", "A county is prohibited from charging fees for filing an initial application."),
                candidate("P1", "Staff must verify applicant identity before any benefits are issued to the household."),
                candidate("S1", "The board must approve the budget before the fiscal year begins."),
                candidate("S1", "The clerk shall file the notice within ten days of receipt."),
            ],
        );

        let ids: Vec<(&str, &str)> = report
            .requirements
            .iter()
            .map(|r| (r.requirement_id.as_str(), r.chunk_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("REQ-S001", "S1"),
                ("REQ-S002", "S1"),
                ("REQ-P001", "P1"),
                ("REQ-S003", "S2"),
            ]
        );
        assert!(report.requirements[0].exact_quote.starts_with("The clerk"));
    }

    #[test]
    fn test_eligible_chunks_skip_narrative() {
        let chunks = vec![
            chunk("S1", SourceType::Statute, "This chapter describes the history of the program."),
            chunk("P1", SourceType::Policy, "Workers shall document every contact."),
        ];
        let eligible = eligible_chunks(&chunks);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].chunk_id, "P1");
    }

    proptest! {
        #[test]
        fn prop_ids_independent_of_candidate_order(seed in any::<u64>()) {
            let sentences = [
                "The department shall publish the schedule on its website every quarter.",
                "Applicants must submit proof of residency with the initial application form.",
                "Late filings are prohibited unless the director grants a written extension.",
                "Each provider is required to maintain records for at least five years.",
            ];
            let chunks = vec![
                chunk("S1", SourceType::Statute, &format!("{} {}", sentences[0], sentences[1])),
                chunk("P1", SourceType::Policy, &format!("{} {}", sentences[2], sentences[3])),
            ];
            let mut candidates = vec![
                candidate("S1", sentences[0]),
                candidate("S1", sentences[1]),
                candidate("P1", sentences[2]),
                candidate("P1", sentences[3]),
            ];

            let baseline = assemble_requirements(&chunks, candidates.clone());

            // Deterministic shuffle driven by the seed
            let mut state = seed;
            for i in (1..candidates.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                candidates.swap(i, j);
            }
            let shuffled = assemble_requirements(&chunks, candidates);

            let ids = |r: &ExtractionReport| r.requirements.iter().map(|q| (q.requirement_id.clone(), q.exact_quote.clone())).collect::<Vec<_>>();
            prop_assert_eq!(ids(&baseline), ids(&shuffled));
        }

        #[test]
        fn prop_kept_quotes_are_verbatim_and_bounded(extra in 0usize..60) {
            let text = format!(
                "Every county shall {} deliver the report to the state auditor.",
                "promptly ".repeat(extra)
            );
            let chunks = vec![chunk("S1", SourceType::Statute, &text)];
            let report = assemble_requirements(&chunks, vec![candidate("S1", &text)]);

            for req in &report.requirements {
                prop_assert!(text.contains(&req.exact_quote));
                prop_assert!(word_count(&req.exact_quote) <= MAX_QUOTE_WORDS);
                prop_assert!(normalize_whitespace(&text).contains(&normalize_whitespace(&req.exact_quote)));
            }
            prop_assert_eq!(report.requirements.len(), 1);
        }
    }
}
