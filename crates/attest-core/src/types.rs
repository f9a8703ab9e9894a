//! Core data model for the evidence pipeline.
//!
//! Everything here is request-scoped: created during one pipeline run,
//! never edited by a later stage, and dropped when the run is returned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which corpus a passage was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Statute,
    Policy,
}

impl SourceType {
    /// Both source types, in retrieval order.
    pub const ALL: [SourceType; 2] = [SourceType::Statute, SourceType::Policy];

    /// Single-letter prefix used in chunk IDs ("S1") and requirement IDs ("REQ-S001").
    pub fn prefix(&self) -> char {
        match self {
            SourceType::Statute => 'S',
            SourceType::Policy => 'P',
        }
    }

    /// Lowercase label used in prompts and hints.
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Statute => "statute",
            SourceType::Policy => "policy",
        }
    }

    /// Resolve a source type from an ID prefix letter.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'S' => Some(SourceType::Statute),
            'P' => Some(SourceType::Policy),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A retrieved passage of source text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable within a request, e.g. "S1", "P4"
    pub chunk_id: String,

    pub source_type: SourceType,

    /// Human-readable citation key (e.g. "Gov. Code § 12345")
    pub document_id: String,

    pub section_heading: String,

    pub text: String,

    /// Similarity to the query, 0.0 - 1.0
    pub similarity_score: f64,
}

impl Chunk {
    /// Build the chunk ID for the `rank`-th (1-based) result of a source type.
    pub fn label(source_type: SourceType, rank: usize) -> String {
        format!("{}{}", source_type.prefix(), rank)
    }
}

/// How confident the extractor was that a quote states a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionConfidence {
    High,
    #[default]
    Medium,
    Low,
}

/// A verbatim normative quotation lifted from one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRequirement {
    /// `REQ-<S|P><seq>`, unique within a run
    pub requirement_id: String,

    pub source_type: SourceType,

    pub document_id: String,

    pub section_heading: String,

    /// Verbatim slice of the referenced chunk's text
    pub exact_quote: String,

    /// Back-reference to the chunk the quote came from
    pub chunk_id: String,

    pub extraction_confidence: ExtractionConfidence,
}

/// Why the verification gate rejected a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    DoesNotAddressQuestion,
    RequiresInference,
    IncompleteQuote,
}

impl RejectionReason {
    /// Default tie-break order when several criteria fail at once.
    pub const ALL: [RejectionReason; 3] = [
        RejectionReason::DoesNotAddressQuestion,
        RejectionReason::RequiresInference,
        RejectionReason::IncompleteQuote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::DoesNotAddressQuestion => "does_not_address_question",
            RejectionReason::RequiresInference => "requires_inference",
            RejectionReason::IncompleteQuote => "incomplete_quote",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verification gate's decision for one requirement.
///
/// `rejection_reason` is `None` when the requirement was verified, and also
/// when the verifier returned no verdict for it at all (it is still rejected).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub requirement_id: String,
    pub verified: bool,
    pub rejection_reason: Option<RejectionReason>,
    pub rationale: String,
}

impl VerificationResult {
    pub fn accepted(requirement_id: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            requirement_id: requirement_id.into(),
            verified: true,
            rejection_reason: None,
            rationale: rationale.into(),
        }
    }

    pub fn rejected(
        requirement_id: impl Into<String>,
        reason: RejectionReason,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            requirement_id: requirement_id.into(),
            verified: false,
            rejection_reason: Some(reason),
            rationale: rationale.into(),
        }
    }

    /// A requirement the verifier never ruled on.
    pub fn unjudged(requirement_id: impl Into<String>) -> Self {
        Self {
            requirement_id: requirement_id.into(),
            verified: false,
            rejection_reason: None,
            rationale: "no verdict returned by verifier".to_string(),
        }
    }
}

/// Confidence in a composed answer, derived from how many verified
/// requirements it actually cites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionConfidence {
    High,
    Medium,
    Low,
    Insufficient,
}

impl CompositionConfidence {
    /// >= 5 used: high; 2-4: medium; 1: low; 0: insufficient.
    pub fn from_used_count(used: usize) -> Self {
        match used {
            0 => CompositionConfidence::Insufficient,
            1 => CompositionConfidence::Low,
            2..=4 => CompositionConfidence::Medium,
            _ => CompositionConfidence::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompositionConfidence::High => "high",
            CompositionConfidence::Medium => "medium",
            CompositionConfidence::Low => "low",
            CompositionConfidence::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for CompositionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a verified requirement made it into the answer text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementReference {
    pub requirement_id: String,
    pub used_in_answer: bool,
}

/// An answer built from verified requirements, with inline `[REQ-ID]` markers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposedAnswer {
    pub final_answer: String,

    /// One entry per verified requirement, in verification order
    pub requirement_references: Vec<RequirementReference>,

    /// Verified but not cited
    pub unused_requirements: Vec<String>,

    pub composition_confidence: CompositionConfidence,
}

impl ComposedAnswer {
    /// IDs of verified requirements cited in the answer.
    pub fn used_requirement_ids(&self) -> Vec<String> {
        self.requirement_references
            .iter()
            .filter(|r| r.used_in_answer)
            .map(|r| r.requirement_id.clone())
            .collect()
    }
}

/// The six fixed quality criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Completeness,
    Accuracy,
    Actionability,
    Clarity,
    Consistency,
    Citations,
}

impl Criterion {
    pub const ALL: [Criterion; 6] = [
        Criterion::Completeness,
        Criterion::Accuracy,
        Criterion::Actionability,
        Criterion::Clarity,
        Criterion::Consistency,
        Criterion::Citations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Completeness => "completeness",
            Criterion::Accuracy => "accuracy",
            Criterion::Actionability => "actionability",
            Criterion::Clarity => "clarity",
            Criterion::Consistency => "consistency",
            Criterion::Citations => "citations",
        }
    }

    /// Parse a criterion name as the reviewer spells it.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality review of one composition attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityScore {
    /// Every criterion, 0.0 - 10.0
    pub criteria_scores: BTreeMap<Criterion, f64>,

    /// Arithmetic mean of `criteria_scores`
    pub overall_score: f64,

    pub passes: bool,

    pub issues: Vec<String>,
}
