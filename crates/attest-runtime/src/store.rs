//! Chunk store: the semantic search engine behind retrieval.
//!
//! Production deployments put a vector store behind [`ChunkStore`]. The
//! [`InMemoryChunkStore`] scores passages by lexical cosine similarity and
//! is used by the CLI and tests.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use attest_core::{candidate_pool_size, select_chunks, Chunk, ScoredPassage, SourceType};

use crate::resilience::Transient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Search backend unreachable: {0}")]
    Unavailable(String),

    #[error("Search timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to load corpus: {0}")]
    Corpus(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Semantic search over one corpus of statutes and policies.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Top `top_k` chunks of `source_type` at or above `similarity_threshold`,
    /// in descending similarity, labelled `S1..`/`P1..`.
    async fn search(
        &self,
        query: &str,
        source_type: SourceType,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<Vec<Chunk>, StoreError>;

    fn name(&self) -> &str;
}

/// One passage of a corpus file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusPassage {
    pub source_type: SourceType,
    pub document_id: String,
    #[serde(default)]
    pub section_heading: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CorpusFile {
    passages: Vec<CorpusPassage>,
}

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"[A-Za-z0-9]+").unwrap();
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "if", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "will", "with",
];

/// Lowercased content words with a naive plural strip.
fn terms(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for m in TOKEN_PATTERN.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        let stem = match word.strip_suffix('s') {
            Some(stem) if stem.len() > 3 && !stem.ends_with(['s', 'u', 'i']) => stem.to_string(),
            _ => word,
        };
        *counts.entry(stem).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|w| w * w).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

struct IndexedPassage {
    passage: CorpusPassage,
    terms: HashMap<String, f64>,
}

/// Lexical in-memory store.
pub struct InMemoryChunkStore {
    passages: Vec<IndexedPassage>,
    overfetch_factor: usize,
}

impl InMemoryChunkStore {
    pub fn new(passages: Vec<CorpusPassage>) -> Self {
        let passages = passages
            .into_iter()
            .map(|passage| IndexedPassage {
                terms: terms(&format!("{} {}", passage.section_heading, passage.text)),
                passage,
            })
            .collect();
        Self {
            passages,
            overfetch_factor: attest_core::retrieval::DEFAULT_OVERFETCH_FACTOR,
        }
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    /// Corpus as `{"passages": [...]}` YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, StoreError> {
        let corpus: CorpusFile =
            serde_yaml::from_str(yaml).map_err(|e| StoreError::Corpus(e.to_string()))?;
        Ok(Self::new(corpus.passages))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let corpus: CorpusFile =
            serde_json::from_str(json).map_err(|e| StoreError::Corpus(e.to_string()))?;
        Ok(Self::new(corpus.passages))
    }

    /// Load a corpus file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| StoreError::Corpus(format!("{}: {}", path.display(), e)))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn search(
        &self,
        query: &str,
        source_type: SourceType,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<Vec<Chunk>, StoreError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            tracing::debug!(query, "Query has no searchable terms");
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut candidates: Vec<ScoredPassage> = self
            .passages
            .iter()
            .filter(|p| p.passage.source_type == source_type)
            .filter(|p| seen.insert((&p.passage.document_id, &p.passage.section_heading, &p.passage.text)))
            .map(|p| ScoredPassage {
                document_id: p.passage.document_id.clone(),
                section_heading: p.passage.section_heading.clone(),
                text: p.passage.text.clone(),
                score: cosine(&query_terms, &p.terms),
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(candidate_pool_size(top_k, self.overfetch_factor));

        Ok(select_chunks(source_type, candidates, top_k, similarity_threshold))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
