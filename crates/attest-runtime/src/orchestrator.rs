//! Pipeline orchestrator.
//!
//! Drives one question through the state machine:
//! - Retrieval of statutes and policies (concurrent, retried, time-limited)
//! - Extraction, verification, then either `NO_EVIDENCE` or composition
//! - Review, with a bounded revision loop back to composition
//! - One audit record per transition, and a summary at the end
//!
//! A transport failure that outlives its retries ends the run with an
//! `Unavailable` outcome; it is never reported as missing evidence.

use futures::future::try_join;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use attest_core::{
    assemble_answer, query_with_hint, Attempt, AuditRecord, Chunk, Outcome, PipelineState,
    Service, SourceType, StageSignal, TransitionError,
};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::{ConfigError, RuntimeConfig};
use crate::invoke::ModelInvoker;
use crate::providers::LlmProvider;
use crate::resilience::{retry_transient, Exhausted, LlmUsage, UsageTracker};
use crate::run::{PipelineRun, RunDraft};
use crate::stages::{
    AnswerComposer, GroundingVerifier, QualityReviewer, RequirementExtractor, StageError,
};
use crate::store::{ChunkStore, StoreError};

/// Errors that stop a run without producing an outcome.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Run cancelled before {0}")]
    Cancelled(PipelineState),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("State machine rejected a transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("No chunk store configured")]
    StoreNotConfigured,
}

/// What one stage reports, besides its artifacts.
struct Step {
    signal: StageSignal,
    evidence: Option<bool>,
    passes: Option<bool>,
    attempt: Option<u32>,
    detail: String,
}

impl Step {
    fn new(signal: StageSignal, detail: impl Into<String>) -> Self {
        Self {
            signal,
            evidence: None,
            passes: None,
            attempt: None,
            detail: detail.into(),
        }
    }
}

/// An external service that stayed down.
struct Unavailable {
    service: Service,
    reason: String,
}

impl From<StageError> for Unavailable {
    fn from(err: StageError) -> Self {
        Self {
            service: Service::Model,
            reason: err.to_string(),
        }
    }
}

impl From<Exhausted<StoreError>> for Unavailable {
    fn from(exhausted: Exhausted<StoreError>) -> Self {
        Self {
            service: Service::Retrieval,
            reason: format!("{} (after {} attempt(s))", exhausted.error, exhausted.attempts),
        }
    }
}

/// Runs questions through the evidence pipeline.
///
/// Holds only shared, read-only collaborators, so one orchestrator can serve
/// concurrent runs. Each run gets its own invoker and usage tracker.
pub struct PipelineOrchestrator {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ChunkStore>,
    config: RuntimeConfig,
    audit: Arc<dyn AuditSink>,
    lifetime_usage: UsageTracker,
}

impl PipelineOrchestrator {
    pub fn builder() -> PipelineOrchestratorBuilder {
        PipelineOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Model usage summed over every run so far.
    pub fn usage(&self) -> LlmUsage {
        self.lifetime_usage.snapshot()
    }

    /// Answer a question.
    pub async fn run(
        &self,
        question: &str,
        topic_hint: Option<&str>,
    ) -> Result<PipelineRun, PipelineError> {
        self.run_cancellable(question, topic_hint, &CancellationToken::new())
            .await
    }

    /// Answer a question, checking `cancel` before each stage.
    ///
    /// A cancelled run returns [`PipelineError::Cancelled`] and no partial
    /// answer.
    pub async fn run_cancellable(
        &self,
        question: &str,
        topic_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let usage = Arc::new(UsageTracker::new());
        let invoker = ModelInvoker::new(
            self.provider.clone(),
            self.config.model.name.clone(),
            self.config.model.max_tokens,
            self.config.timeouts.model,
            self.config.retry.clone(),
            usage.clone(),
        );

        let mut draft = RunDraft::new(question, topic_hint);
        let mut state = PipelineState::Retrieve;

        tracing::info!(
            provider = self.provider.name(),
            store = self.store.name(),
            "Pipeline run started"
        );

        while !state.is_terminal() {
            if cancel.is_cancelled() {
                tracing::warn!(state = %state, "Pipeline run cancelled");
                return Err(PipelineError::Cancelled(state));
            }

            let started = Instant::now();
            let step = match self.step(state, &mut draft, &invoker).await {
                Ok(Some(step)) => step,
                Ok(None) => break,
                Err(unavailable) => {
                    tracing::warn!(
                        state = %state,
                        service = %unavailable.service,
                        reason = %unavailable.reason,
                        "Pipeline run aborted"
                    );
                    let record = AuditRecord::new(state, state, draft.counts())
                        .latency(started.elapsed())
                        .detail(unavailable.reason.clone());
                    self.emit(&mut draft, record);

                    let outcome = Outcome::unavailable(unavailable.service, state, unavailable.reason);
                    return Ok(self.finish(draft, state, outcome, &usage));
                }
            };

            let next = state.advance(&step.signal)?;
            if state == PipelineState::Review && next == PipelineState::Compose {
                draft.revision_count += 1;
            }

            let mut record = AuditRecord::new(state, next, draft.counts())
                .latency(started.elapsed())
                .detail(step.detail);
            if let Some(evidence) = step.evidence {
                record = record.evidence(evidence);
            }
            if let Some(passes) = step.passes {
                record = record.passes(passes);
            }
            if let Some(attempt) = step.attempt {
                record = record.attempt(attempt);
            }
            self.emit(&mut draft, record);

            tracing::info!(from = %state, to = %next, "State transition");
            state = next;
        }

        let outcome = match draft.attempts.last() {
            Some(attempt) if state == PipelineState::Finalize => Outcome::finalized(attempt),
            _ => Outcome::no_evidence(&draft.verified),
        };
        Ok(self.finish(draft, state, outcome, &usage))
    }

    async fn step(
        &self,
        state: PipelineState,
        draft: &mut RunDraft,
        invoker: &ModelInvoker,
    ) -> Result<Option<Step>, Unavailable> {
        let settings = &self.config.pipeline;

        let step = match state {
            PipelineState::Retrieve => {
                let query = query_with_hint(&draft.question, draft.topic_hint.as_deref());
                draft.chunks = self.retrieve(&query).await?;
                Step::new(StageSignal::Retrieved, format!("query: {}", query))
            }

            PipelineState::Extract => {
                let report = RequirementExtractor::new(invoker)
                    .extract(&draft.question, &draft.chunks)
                    .await?;
                let discarded: Vec<String> = report
                    .discarded
                    .iter()
                    .map(|d| format!("{} ({:?})", d.chunk_id, d.reason))
                    .collect();
                draft.extraction = report;
                Step::new(StageSignal::Extracted, format!("discarded: [{}]", discarded.join(", ")))
            }

            PipelineState::Verify => {
                let outcome = GroundingVerifier::new(invoker, &settings.rejection_priority)
                    .verify(&draft.question, &draft.extraction.requirements)
                    .await?;
                let sufficient = outcome.has_sufficient_evidence();
                let rejections: Vec<String> = outcome
                    .results
                    .iter()
                    .filter(|r| !r.verified)
                    .map(|r| {
                        let reason = r.rejection_reason.map_or("no_verdict", |reason| reason.as_str());
                        format!("{} ({})", r.requirement_id, reason)
                    })
                    .collect();

                draft.verification_results = outcome.results;
                draft.verified = outcome.verified;
                draft.rejected = outcome.rejected;

                let mut step = Step::new(
                    StageSignal::Verified {
                        verified_count: draft.verified.len(),
                    },
                    format!("rejected: [{}]", rejections.join(", ")),
                );
                step.evidence = Some(sufficient);
                step
            }

            PipelineState::Compose => {
                let prior = if draft.revision_count > 0 {
                    draft.attempts.last()
                } else {
                    None
                };
                let composed = AnswerComposer::new(invoker, self.config.stages.composition_temperature)
                    .compose(&draft.question, &draft.verified, prior)
                    .await?;
                let cited = composed.used_requirement_ids().join(", ");
                draft.pending = Some(composed);

                let mut step = Step::new(StageSignal::Composed, format!("cited: [{}]", cited));
                step.attempt = Some(attempt_number(&draft.attempts));
                step
            }

            PipelineState::Review => {
                let composed = draft
                    .pending
                    .take()
                    .unwrap_or_else(|| assemble_answer("", &draft.verified));
                let (quality, grounding) = QualityReviewer::new(
                    invoker,
                    self.config.stages.review_temperature,
                    settings.pass_threshold,
                )
                .review(&draft.question, &composed, &draft.verified)
                .await?;

                let number = attempt_number(&draft.attempts);
                let passes = quality.passes;
                let detail = format!("issues: [{}]", quality.issues.join("; "));
                draft.attempts.push(Attempt {
                    attempt: number,
                    composed,
                    quality,
                    grounding,
                });

                let mut step = Step::new(
                    StageSignal::Reviewed {
                        passes,
                        revision_count: draft.revision_count,
                        max_revisions: settings.max_revisions,
                    },
                    detail,
                );
                step.passes = Some(passes);
                step.attempt = Some(number);
                step
            }

            PipelineState::NoEvidence | PipelineState::Finalize => return Ok(None),
        };

        Ok(Some(step))
    }

    /// Statutes and policies, searched concurrently; statutes first.
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, Exhausted<StoreError>> {
        let (statutes, policies) = try_join(
            self.search(query, SourceType::Statute),
            self.search(query, SourceType::Policy),
        )
        .await?;

        tracing::info!(
            statutes = statutes.len(),
            policies = policies.len(),
            "Retrieval complete"
        );
        Ok(statutes.into_iter().chain(policies).collect())
    }

    async fn search(
        &self,
        query: &str,
        source_type: SourceType,
    ) -> Result<Vec<Chunk>, Exhausted<StoreError>> {
        let settings = &self.config.pipeline;
        let timeout = self.config.timeouts.retrieval;
        let store = &self.store;

        retry_transient(&self.config.retry, "retrieval", || async move {
            let search = store.search(
                query,
                source_type,
                settings.top_k,
                settings.similarity_threshold,
            );
            match tokio::time::timeout(timeout, search).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(timeout)),
            }
        })
        .await
    }

    fn emit(&self, draft: &mut RunDraft, record: AuditRecord) {
        let record = if self.config.pipeline.redact_audit {
            record.redacted()
        } else {
            record
        };
        self.audit.record(&record);
        draft.audit_records.push(record);
    }

    fn finish(
        &self,
        draft: RunDraft,
        state: PipelineState,
        outcome: Outcome,
        usage: &UsageTracker,
    ) -> PipelineRun {
        let usage = usage.snapshot();
        self.lifetime_usage.absorb(&usage);

        let run = draft.finish(state, outcome, usage);
        tracing::info!(
            outcome = run.outcome.kind(),
            attempts = run.attempts.len(),
            revision_count = run.revision_count,
            llm_calls = run.usage.llm_calls,
            "Pipeline run finished"
        );
        run
    }
}

fn attempt_number(attempts: &[Attempt]) -> u32 {
    u32::try_from(attempts.len()).map_or(u32::MAX, |n| n.saturating_add(1))
}

/// Builder for [`PipelineOrchestrator`].
#[derive(Default)]
pub struct PipelineOrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    store: Option<Arc<dyn ChunkStore>>,
    config: Option<RuntimeConfig>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl PipelineOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Defaults to [`TracingAuditSink`].
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> Result<PipelineOrchestrator, PipelineError> {
        let provider = self.provider.ok_or(PipelineError::ProviderNotConfigured)?;
        let store = self.store.ok_or(PipelineError::StoreNotConfigured)?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(PipelineOrchestrator {
            provider,
            store,
            config,
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>),
            lifetime_usage: UsageTracker::new(),
        })
    }
}
