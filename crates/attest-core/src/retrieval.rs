//! Turning raw search hits into labelled chunks.

use serde::{Deserialize, Serialize};

use crate::types::{Chunk, SourceType};

/// How many candidates to fetch per requested result before filtering.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;

pub const DEFAULT_TOP_K: usize = 5;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.25;

/// A search hit before it is labelled as a chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    pub document_id: String,
    pub section_heading: String,
    pub text: String,
    pub score: f64,
}

/// Number of candidates to request from the search engine.
pub fn candidate_pool_size(top_k: usize, overfetch_factor: usize) -> usize {
    top_k.saturating_mul(overfetch_factor.max(1))
}

/// Append the topic hint, if any, to the question to form the search query.
pub fn query_with_hint(question: &str, topic_hint: Option<&str>) -> String {
    match topic_hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => format!("{} {}", question.trim(), hint),
        None => question.trim().to_string(),
    }
}

/// Sort by descending similarity, drop hits under `threshold`, keep the
/// best `top_k`, and label them `S1..`/`P1..` by rank.
pub fn select_chunks(
    source_type: SourceType,
    mut candidates: Vec<ScoredPassage>,
    top_k: usize,
    threshold: f64,
) -> Vec<Chunk> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    candidates
        .into_iter()
        .filter(|c| c.score.is_finite() && c.score >= threshold)
        .take(top_k)
        .enumerate()
        .map(|(i, c)| Chunk {
            chunk_id: Chunk::label(source_type, i + 1),
            source_type,
            document_id: c.document_id,
            section_heading: c.section_heading,
            text: c.text,
            similarity_score: c.score.clamp(0.0, 1.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(doc: &str, score: f64) -> ScoredPassage {
        ScoredPassage {
            document_id: doc.to_string(),
            section_heading: "Heading".to_string(),
            text: "Text".to_string(),
            score,
        }
    }

    #[test]
    fn test_select_sorts_filters_and_caps() {
        let candidates = vec![
            passage("low", 0.1),
            passage("mid", 0.5),
            passage("top", 0.9),
            passage("also", 0.4),
        ];
        let chunks = select_chunks(SourceType::Policy, candidates, 2, 0.25);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "P1");
        assert_eq!(chunks[0].document_id, "top");
        assert_eq!(chunks[1].chunk_id, "P2");
        assert_eq!(chunks[1].document_id, "mid");
    }

    #[test]
    fn test_select_threshold_can_empty_result() {
        let chunks = select_chunks(SourceType::Statute, vec![passage("a", 0.2)], 5, 0.25);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_query_with_hint() {
        assert_eq!(query_with_hint("When must counties report?", None), "When must counties report?");
        assert_eq!(
            query_with_hint("When must counties report?", Some("annual reporting")),
            "When must counties report? annual reporting"
        );
        assert_eq!(query_with_hint("Q?", Some("  ")), "Q?");
    }

    #[test]
    fn test_candidate_pool_size() {
        assert_eq!(candidate_pool_size(5, DEFAULT_OVERFETCH_FACTOR), 15);
        assert_eq!(candidate_pool_size(5, 0), 5);
    }
}
