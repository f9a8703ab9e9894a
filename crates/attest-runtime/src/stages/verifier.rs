//! Grounding verification.

use serde_json::Value;

use attest_core::schema::{validate_model_output, ModelOutputKind};
use attest_core::{
    resolve_verdicts, CriteriaVerdict, ExtractedRequirement, RejectionPriority,
    VerificationOutcome,
};

use super::{parse_detail, StageError, VERIFICATION_TEMPERATURE};
use crate::invoke::ModelInvoker;
use crate::prompts::{verification_request, Stage};

/// Judges every extracted requirement against the three criteria.
pub struct GroundingVerifier<'a> {
    invoker: &'a ModelInvoker,
    priority: &'a RejectionPriority,
}

impl<'a> GroundingVerifier<'a> {
    pub fn new(invoker: &'a ModelInvoker, priority: &'a RejectionPriority) -> Self {
        Self { invoker, priority }
    }

    /// One batched call for all requirements. Requirements the model did not
    /// rule on, including all of them when the response is unusable, are
    /// rejected as unjudged. A malformed verdict leaves its siblings intact.
    pub async fn verify(
        &self,
        question: &str,
        requirements: &[ExtractedRequirement],
    ) -> Result<VerificationOutcome, StageError> {
        if requirements.is_empty() {
            return Ok(VerificationOutcome::default());
        }

        let prompt = verification_request(question, requirements);
        let verdicts = match self
            .invoker
            .invoke_json(
                Stage::Verification,
                &prompt,
                VERIFICATION_TEMPERATURE,
                ModelOutputKind::Verification,
            )
            .await
        {
            Ok(value) => verdicts_from(&value),
            Err(err) => {
                parse_detail(err)?;
                Vec::new()
            }
        };

        let outcome = resolve_verdicts(requirements, verdicts, self.priority);
        tracing::info!(
            verified = outcome.verified.len(),
            rejected = outcome.rejected.len(),
            "Verification complete"
        );
        Ok(outcome)
    }
}

fn verdicts_from(value: &Value) -> Vec<CriteriaVerdict> {
    let items = value["verdicts"].as_array().cloned().unwrap_or_default();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if let Err(errors) = validate_model_output(ModelOutputKind::CriteriaVerdict, &item) {
                tracing::warn!(index, errors = ?errors, "Dropping malformed verdict");
                return None;
            }
            serde_json::from_value::<CriteriaVerdict>(item)
                .map_err(|e| tracing::warn!(index, error = %e, "Dropping malformed verdict"))
                .ok()
        })
        .collect()
}
