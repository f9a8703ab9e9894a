//! The verification gate.
//!
//! The verifier model answers three yes/no questions per requirement. This
//! module turns those answers into a verdict: all three must pass, and when
//! several fail the configured priority picks the reported reason.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::{ExtractedRequirement, RejectionReason, SourceType, VerificationResult};

/// Fixed message for the `NO_EVIDENCE` outcome.
pub const NO_EVIDENCE_MESSAGE: &str =
    "No authoritative requirement was found in the retrieved statutes or policies that answers this question.";

/// The verifier model's judgement on one requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriteriaVerdict {
    pub requirement_id: String,

    /// Directly answers the question, not merely on topic
    pub addresses_question: bool,

    /// Provable from the exact quote alone
    pub supported_by_quote: bool,

    /// Self-contained, no dependence on unretrieved cross-references
    pub complete_quote: bool,

    #[serde(default)]
    pub rationale: String,
}

impl CriteriaVerdict {
    fn fails(&self, reason: RejectionReason) -> bool {
        match reason {
            RejectionReason::DoesNotAddressQuestion => !self.addresses_question,
            RejectionReason::RequiresInference => !self.supported_by_quote,
            RejectionReason::IncompleteQuote => !self.complete_quote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriorityError {
    #[error("rejection priority must list {expected} reasons, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("rejection priority is missing '{0}'")]
    Missing(RejectionReason),
}

/// Order in which failing criteria are reported.
///
/// Must name each rejection reason exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectionPriority(Vec<RejectionReason>);

impl RejectionPriority {
    pub fn new(order: Vec<RejectionReason>) -> Result<Self, PriorityError> {
        let priority = Self(order);
        priority.validate()?;
        Ok(priority)
    }

    /// Check that every reason appears exactly once.
    pub fn validate(&self) -> Result<(), PriorityError> {
        if self.0.len() != RejectionReason::ALL.len() {
            return Err(PriorityError::WrongLength {
                expected: RejectionReason::ALL.len(),
                got: self.0.len(),
            });
        }
        for reason in RejectionReason::ALL {
            if !self.0.contains(&reason) {
                return Err(PriorityError::Missing(reason));
            }
        }
        Ok(())
    }

    pub fn order(&self) -> &[RejectionReason] {
        &self.0
    }

    /// The highest-priority criterion the verdict fails, if any.
    pub fn first_failing(&self, verdict: &CriteriaVerdict) -> Option<RejectionReason> {
        self.0.iter().copied().find(|r| verdict.fails(*r))
    }
}

impl Default for RejectionPriority {
    fn default() -> Self {
        Self(RejectionReason::ALL.to_vec())
    }
}

/// Turn one model verdict into a verification result.
pub fn judge(verdict: &CriteriaVerdict, priority: &RejectionPriority) -> VerificationResult {
    match priority.first_failing(verdict) {
        None => VerificationResult::accepted(&verdict.requirement_id, &verdict.rationale),
        Some(reason) => {
            VerificationResult::rejected(&verdict.requirement_id, reason, &verdict.rationale)
        }
    }
}

/// Results of the verification gate, partitioned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationOutcome {
    /// One per extracted requirement, in extraction order
    pub results: Vec<VerificationResult>,
    pub verified: Vec<ExtractedRequirement>,
    pub rejected: Vec<ExtractedRequirement>,
}

impl VerificationOutcome {
    /// False means the pipeline must not compose.
    pub fn has_sufficient_evidence(&self) -> bool {
        !self.verified.is_empty()
    }
}

/// Match verdicts to requirements and partition them.
///
/// Requirements without a verdict are rejected as unjudged. Verdicts for
/// unknown IDs are ignored; a repeated verdict for the same ID keeps the first.
pub fn resolve_verdicts(
    requirements: &[ExtractedRequirement],
    verdicts: Vec<CriteriaVerdict>,
    priority: &RejectionPriority,
) -> VerificationOutcome {
    let mut by_id: HashMap<String, CriteriaVerdict> = HashMap::new();
    for verdict in verdicts {
        let id = verdict.requirement_id.trim().to_string();
        if !requirements.iter().any(|r| r.requirement_id == id) {
            tracing::warn!(requirement_id = %id, "Verifier returned a verdict for an unknown requirement");
            continue;
        }
        if by_id.contains_key(&id) {
            tracing::warn!(requirement_id = %id, "Verifier returned duplicate verdicts, keeping the first");
            continue;
        }
        by_id.insert(id, verdict);
    }

    let mut outcome = VerificationOutcome::default();
    for requirement in requirements {
        let result = match by_id.get(&requirement.requirement_id) {
            Some(verdict) => {
                let mut result = judge(verdict, priority);
                result.requirement_id = requirement.requirement_id.clone();
                result
            }
            None => VerificationResult::unjudged(&requirement.requirement_id),
        };

        if result.verified {
            outcome.verified.push(requirement.clone());
        } else {
            outcome.rejected.push(requirement.clone());
        }
        outcome.results.push(result);
    }

    outcome
}

/// One hint per source type that contributed no verified requirement.
pub fn missing_evidence_hints(verified: &[ExtractedRequirement]) -> Vec<String> {
    SourceType::ALL
        .into_iter()
        .filter(|source| !verified.iter().any(|r| r.source_type == *source))
        .map(|source| match source {
            SourceType::Statute => {
                "No verified statute requirement addresses this question; the governing statute may not be in the indexed corpus.".to_string()
            }
            SourceType::Policy => {
                "No verified policy manual requirement addresses this question; check the program's policy manual for an applicable section.".to_string()
            }
        })
        .collect()
}
