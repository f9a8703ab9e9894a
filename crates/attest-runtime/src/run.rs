//! The record of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use attest_core::{
    Attempt, AuditRecord, AuditSummary, Chunk, ComposedAnswer, CompositionConfidence,
    ExtractedRequirement, ExtractionReport, Outcome, PipelineState, StageCounts,
    VerificationResult,
};

use crate::resilience::LlmUsage;

/// Everything a run produced, from retrieved chunks to the outcome.
///
/// Written only by the orchestrator and immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub question: String,
    pub topic_hint: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Terminal state, or the stage that was unavailable
    pub final_state: PipelineState,

    pub chunks: Vec<Chunk>,
    pub extraction: ExtractionReport,

    /// One per extracted requirement, in extraction order
    pub verification_results: Vec<VerificationResult>,
    pub verified_requirements: Vec<ExtractedRequirement>,
    pub rejected_requirements: Vec<ExtractedRequirement>,
    pub has_sufficient_evidence: bool,

    /// Every composition attempt, oldest first
    pub attempts: Vec<Attempt>,
    pub revision_count: u32,

    pub outcome: Outcome,
    pub audit_records: Vec<AuditRecord>,
    pub audit_summary: AuditSummary,
    pub usage: LlmUsage,
}

impl PipelineRun {
    pub fn extracted_requirements(&self) -> &[ExtractedRequirement] {
        &self.extraction.requirements
    }

    pub fn final_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Confidence of the last composed answer; insufficient when nothing
    /// was composed.
    pub fn grounding_confidence(&self) -> CompositionConfidence {
        self.final_attempt()
            .map_or(CompositionConfidence::Insufficient, |a| {
                a.composed.composition_confidence
            })
    }
}

/// A run in progress.
#[derive(Debug)]
pub(crate) struct RunDraft {
    pub question: String,
    pub topic_hint: Option<String>,
    pub started_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    pub extraction: ExtractionReport,
    pub verification_results: Vec<VerificationResult>,
    pub verified: Vec<ExtractedRequirement>,
    pub rejected: Vec<ExtractedRequirement>,
    pub attempts: Vec<Attempt>,
    /// Composed but not yet reviewed
    pub pending: Option<ComposedAnswer>,
    pub revision_count: u32,
    pub audit_records: Vec<AuditRecord>,
}

impl RunDraft {
    pub fn new(question: &str, topic_hint: Option<&str>) -> Self {
        Self {
            question: question.to_string(),
            topic_hint: topic_hint.map(str::to_string),
            started_at: Utc::now(),
            chunks: Vec::new(),
            extraction: ExtractionReport::default(),
            verification_results: Vec::new(),
            verified: Vec::new(),
            rejected: Vec::new(),
            attempts: Vec::new(),
            pending: None,
            revision_count: 0,
            audit_records: Vec::new(),
        }
    }

    pub fn counts(&self) -> StageCounts {
        let used = match (&self.pending, self.attempts.last()) {
            (Some(composed), _) => composed.used_requirement_ids().len(),
            (None, Some(attempt)) => attempt.composed.used_requirement_ids().len(),
            (None, None) => 0,
        };
        StageCounts {
            retrieved: self.chunks.len(),
            extracted: self.extraction.requirements.len(),
            verified: self.verified.len(),
            rejected: self.rejected.len(),
            used,
        }
    }

    pub fn finish(self, final_state: PipelineState, outcome: Outcome, usage: LlmUsage) -> PipelineRun {
        let audit_summary = AuditSummary::compile(
            self.chunks.len(),
            &self.verification_results,
            &self.attempts,
            self.revision_count,
        );

        PipelineRun {
            question: self.question,
            topic_hint: self.topic_hint,
            started_at: self.started_at,
            completed_at: Utc::now(),
            final_state,
            chunks: self.chunks,
            extraction: self.extraction,
            verification_results: self.verification_results,
            has_sufficient_evidence: !self.verified.is_empty(),
            verified_requirements: self.verified,
            rejected_requirements: self.rejected,
            attempts: self.attempts,
            revision_count: self.revision_count,
            outcome,
            audit_records: self.audit_records,
            audit_summary,
            usage,
        }
    }
}
