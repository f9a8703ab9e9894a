//! What a caller gets back from a pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::citations::GroundingReport;
use crate::state::PipelineState;
use crate::types::{ComposedAnswer, CompositionConfidence, ExtractedRequirement, QualityScore};
use crate::verification::{missing_evidence_hints, NO_EVIDENCE_MESSAGE};

/// One composition attempt, frozen once reviewed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    /// 1-based
    pub attempt: u32,
    pub composed: ComposedAnswer,
    pub quality: QualityScore,
    pub grounding: GroundingReport,
}

/// External dependency that was unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Retrieval,
    Model,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Retrieval => f.write_str("retrieval"),
            Service::Model => f.write_str("model"),
        }
    }
}

/// The three shapes a run can end in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Finalized {
        final_answer: String,
        citations: Vec<String>,
        confidence: CompositionConfidence,
        passes: bool,
        grounding_violations: Vec<String>,
    },
    NoEvidence {
        message: String,
        missing_evidence: Vec<String>,
    },
    Unavailable {
        service: Service,
        stage: PipelineState,
        reason: String,
    },
}

impl Outcome {
    /// Finalize on the given (last) attempt, passing or not.
    pub fn finalized(attempt: &Attempt) -> Self {
        Outcome::Finalized {
            final_answer: attempt.composed.final_answer.clone(),
            citations: attempt.composed.used_requirement_ids(),
            confidence: attempt.composed.composition_confidence,
            passes: attempt.quality.passes,
            grounding_violations: attempt.grounding.violations(),
        }
    }

    pub fn no_evidence(verified: &[ExtractedRequirement]) -> Self {
        Outcome::NoEvidence {
            message: NO_EVIDENCE_MESSAGE.to_string(),
            missing_evidence: missing_evidence_hints(verified),
        }
    }

    pub fn unavailable(service: Service, stage: PipelineState, reason: impl Into<String>) -> Self {
        Outcome::Unavailable {
            service,
            stage,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Finalized { .. } => "finalized",
            Outcome::NoEvidence { .. } => "no_evidence",
            Outcome::Unavailable { .. } => "unavailable",
        }
    }
}
