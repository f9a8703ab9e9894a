//! # attest-core
//!
//! Deterministic evidence rules for grounded compliance answers.
//!
//! This crate holds everything in the evidence pipeline that does not need a
//! language model:
//! - which source sentences count as requirements, and how quotes are fitted
//! - requirement ID assignment
//! - turning verifier verdicts into accept/reject decisions
//! - citation parsing and the grounding check
//! - quality scoring and the pipeline state machine
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same chunks and candidates always give the same IDs
//! 2. **No LLM calls**: model output is input here, never produced here
//! 3. **Verbatim**: every stored quote is a slice of its chunk's text
//! 4. **Grounded**: an answer with an uncited sentence or unknown citation never passes
//!
//! ## Example
//!
//! ```rust,ignore
//! use attest_core::{assemble_answer, check_grounding};
//!
//! let composed = assemble_answer(&model_text, &verified);
//! let ids = composed.used_requirement_ids();
//! let report = check_grounding(&composed.final_answer, &verified_ids);
//! assert!(report.is_grounded());
//! ```

pub mod audit;
pub mod citations;
pub mod composition;
pub mod extraction;
pub mod normative;
pub mod outcome;
pub mod quality;
pub mod retrieval;
pub mod schema;
pub mod settings;
pub mod state;
pub mod types;
pub mod verification;

// Re-export main types at crate root
pub use audit::{AuditRecord, AuditSummary, StageCounts};
pub use citations::{check_grounding, cited_ids, GroundingReport};
pub use composition::assemble_answer;
pub use extraction::{assemble_requirements, eligible_chunks, ExtractionReport, RequirementCandidate};
pub use outcome::{Attempt, Outcome, Service};
pub use quality::{ReviewerScores, DEFAULT_PASS_THRESHOLD};
pub use retrieval::{candidate_pool_size, query_with_hint, select_chunks, ScoredPassage};
pub use schema::{parse_model_json, validate_model_output, ModelOutputKind};
pub use settings::{PipelineSettings, SettingsError};
pub use state::{PipelineState, StageSignal, TransitionError};
pub use types::{
    Chunk, ComposedAnswer, CompositionConfidence, Criterion, ExtractedRequirement,
    ExtractionConfidence, QualityScore, RejectionReason, RequirementReference, SourceType,
    VerificationResult,
};
pub use verification::{
    missing_evidence_hints, resolve_verdicts, CriteriaVerdict, PriorityError, RejectionPriority,
    VerificationOutcome, NO_EVIDENCE_MESSAGE,
};
