//! Audit records and the end-of-run summary.
//!
//! One `AuditRecord` is emitted per stage transition. Records carry counts
//! and outcomes only; free text goes in `detail`, which redaction drops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::outcome::Attempt;
use crate::state::PipelineState;
use crate::types::{CompositionConfidence, VerificationResult};

/// Reason key for requirements the verifier never ruled on.
pub const NO_VERDICT: &str = "no_verdict";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageCounts {
    pub retrieved: usize,
    pub extracted: usize,
    pub verified: usize,
    pub rejected: usize,
    pub used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: PipelineState,
    pub next_state: PipelineState,
    pub counts: StageCounts,
    pub latency_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_sufficient_evidence: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub passes: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(stage: PipelineState, next_state: PipelineState, counts: StageCounts) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            next_state,
            counts,
            latency_ms: 0,
            has_sufficient_evidence: None,
            passes: None,
            attempt: None,
            detail: None,
        }
    }

    pub fn latency(mut self, elapsed: Duration) -> Self {
        self.latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn evidence(mut self, has_sufficient_evidence: bool) -> Self {
        self.has_sufficient_evidence = Some(has_sufficient_evidence);
        self
    }

    pub fn passes(mut self, passes: bool) -> Self {
        self.passes = Some(passes);
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Drop any free text.
    pub fn redacted(mut self) -> Self {
        self.detail = None;
        self
    }
}

/// Aggregate view of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditSummary {
    pub counts: StageCounts,

    /// verified / extracted, 0.0 when nothing was extracted
    pub verification_pass_rate: f64,

    /// Keyed by rejection reason, plus `no_verdict`
    pub rejections_by_reason: BTreeMap<String, usize>,

    pub attempts: usize,
    pub revision_count: u32,
    pub final_passes: Option<bool>,
    pub final_confidence: Option<CompositionConfidence>,
    pub grounding_violations: Vec<String>,
}

impl AuditSummary {
    pub fn compile(
        retrieved: usize,
        results: &[VerificationResult],
        attempts: &[Attempt],
        revision_count: u32,
    ) -> Self {
        let extracted = results.len();
        let verified = results.iter().filter(|r| r.verified).count();

        let mut rejections_by_reason = BTreeMap::new();
        for result in results.iter().filter(|r| !r.verified) {
            let key = result
                .rejection_reason
                .map_or(NO_VERDICT, |reason| reason.as_str());
            *rejections_by_reason.entry(key.to_string()).or_insert(0) += 1;
        }

        let last = attempts.last();

        Self {
            counts: StageCounts {
                retrieved,
                extracted,
                verified,
                rejected: extracted - verified,
                used: last.map_or(0, |a| a.composed.used_requirement_ids().len()),
            },
            verification_pass_rate: if extracted == 0 {
                0.0
            } else {
                verified as f64 / extracted as f64
            },
            rejections_by_reason,
            attempts: attempts.len(),
            revision_count,
            final_passes: last.map(|a| a.quality.passes),
            final_confidence: last.map(|a| a.composed.composition_confidence),
            grounding_violations: last.map(|a| a.grounding.violations()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RejectionReason;

    #[test]
    fn test_record_builder_and_redaction() {
        let record = AuditRecord::new(PipelineState::Verify, PipelineState::Compose, StageCounts::default())
            .latency(Duration::from_millis(42))
            .evidence(true)
            .detail("question: when must counties report?");
        assert_eq!(record.latency_ms, 42);
        assert_eq!(record.has_sufficient_evidence, Some(true));
        assert!(record.detail.is_some());

        let redacted = record.redacted();
        assert!(redacted.detail.is_none());
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("counties"));
    }

    #[test]
    fn test_summary_counts_rejections() {
        let results = vec![
            VerificationResult::accepted("REQ-S001", "ok"),
            VerificationResult::rejected("REQ-S002", RejectionReason::RequiresInference, "no"),
            VerificationResult::rejected("REQ-P001", RejectionReason::RequiresInference, "no"),
            VerificationResult::unjudged("REQ-P002"),
        ];
        let summary = AuditSummary::compile(6, &results, &[], 0);

        assert_eq!(summary.counts.retrieved, 6);
        assert_eq!(summary.counts.extracted, 4);
        assert_eq!(summary.counts.verified, 1);
        assert_eq!(summary.counts.rejected, 3);
        assert_eq!(summary.verification_pass_rate, 0.25);
        assert_eq!(summary.rejections_by_reason["requires_inference"], 2);
        assert_eq!(summary.rejections_by_reason[NO_VERDICT], 1);
        assert_eq!(summary.final_passes, None);
    }

    #[test]
    fn test_summary_with_no_extraction() {
        let summary = AuditSummary::compile(0, &[], &[], 0);
        assert_eq!(summary.verification_pass_rate, 0.0);
        assert!(summary.rejections_by_reason.is_empty());
    }
}
