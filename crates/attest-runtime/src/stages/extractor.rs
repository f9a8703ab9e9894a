//! Requirement extraction.

use serde_json::Value;

use attest_core::schema::{validate_model_output, ModelOutputKind};
use attest_core::{
    assemble_requirements, eligible_chunks, Chunk, ExtractionReport, RequirementCandidate,
    SourceType,
};

use super::{parse_detail, StageError, EXTRACTION_TEMPERATURE};
use crate::invoke::ModelInvoker;
use crate::prompts::{extraction_request, Stage};

/// Turns retrieved chunks into verbatim normative quotations.
pub struct RequirementExtractor<'a> {
    invoker: &'a ModelInvoker,
}

impl<'a> RequirementExtractor<'a> {
    pub fn new(invoker: &'a ModelInvoker) -> Self {
        Self { invoker }
    }

    /// Extract requirements from `chunks` (in retrieval order).
    ///
    /// Chunks without a normative sentence are never sent to the model.
    /// Statute and policy chunks are extracted concurrently. A malformed
    /// response yields no candidates for that group; it does not fail the run.
    pub async fn extract(
        &self,
        question: &str,
        chunks: &[Chunk],
    ) -> Result<ExtractionReport, StageError> {
        let eligible = eligible_chunks(chunks);
        if eligible.is_empty() {
            tracing::info!(chunks = chunks.len(), "No retrieved chunk contains normative language");
            return Ok(ExtractionReport::default());
        }

        let (statutes, policies): (Vec<&Chunk>, Vec<&Chunk>) = eligible
            .into_iter()
            .partition(|c| c.source_type == SourceType::Statute);

        let (statute_candidates, policy_candidates) = tokio::join!(
            self.propose(question, &statutes),
            self.propose(question, &policies),
        );

        let mut candidates = statute_candidates?;
        candidates.extend(policy_candidates?);

        let report = assemble_requirements(chunks, candidates);
        tracing::info!(
            extracted = report.requirements.len(),
            discarded = report.discarded.len(),
            "Extraction complete"
        );
        Ok(report)
    }

    async fn propose(
        &self,
        question: &str,
        chunks: &[&Chunk],
    ) -> Result<Vec<RequirementCandidate>, StageError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = extraction_request(question, chunks);
        let value = match self
            .invoker
            .invoke_json(Stage::Extraction, &prompt, EXTRACTION_TEMPERATURE, ModelOutputKind::Extraction)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                parse_detail(err)?;
                return Ok(Vec::new());
            }
        };

        Ok(candidates_from(&value))
    }
}

/// Keep each well-formed candidate; drop malformed items individually.
fn candidates_from(value: &Value) -> Vec<RequirementCandidate> {
    let items = value["requirements"].as_array().cloned().unwrap_or_default();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if let Err(errors) = validate_model_output(ModelOutputKind::RequirementCandidate, &item) {
                tracing::warn!(index, errors = ?errors, "Dropping malformed extraction candidate");
                return None;
            }
            serde_json::from_value::<RequirementCandidate>(item)
                .map_err(|e| tracing::warn!(index, error = %e, "Dropping malformed extraction candidate"))
                .ok()
        })
        .collect()
}
