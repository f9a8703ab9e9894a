//! Quality review.

use attest_core::schema::ModelOutputKind;
use attest_core::{
    check_grounding, ComposedAnswer, ExtractedRequirement, GroundingReport, QualityScore,
    ReviewerScores,
};

use super::{parse_detail, StageError};
use crate::invoke::ModelInvoker;
use crate::prompts::{review_request, Stage};

pub struct QualityReviewer<'a> {
    invoker: &'a ModelInvoker,
    temperature: f32,
    pass_threshold: f64,
}

impl<'a> QualityReviewer<'a> {
    pub fn new(invoker: &'a ModelInvoker, temperature: f32, pass_threshold: f64) -> Self {
        Self {
            invoker,
            temperature,
            pass_threshold,
        }
    }

    /// Score an answer and check its citations.
    ///
    /// The grounding check runs locally and is never delegated to the model;
    /// any violation fails the attempt whatever the scores say. A review that
    /// cannot be parsed fails the attempt too.
    pub async fn review(
        &self,
        question: &str,
        composed: &ComposedAnswer,
        verified: &[ExtractedRequirement],
    ) -> Result<(QualityScore, GroundingReport), StageError> {
        let verified_ids: Vec<String> = verified.iter().map(|r| r.requirement_id.clone()).collect();
        let grounding = check_grounding(&composed.final_answer, &verified_ids);

        let prompt = review_request(question, composed, verified);
        let quality = match self
            .invoker
            .invoke_structured::<ReviewerScores>(
                Stage::Review,
                &prompt,
                self.temperature,
                ModelOutputKind::Review,
            )
            .await
        {
            Ok(scores) => QualityScore::assess(scores, &grounding, self.pass_threshold),
            Err(err) => {
                let detail = parse_detail(err)?;
                QualityScore::unparsed(&detail, &grounding, self.pass_threshold)
            }
        };

        tracing::info!(
            overall = quality.overall_score,
            passes = quality.passes,
            grounded = grounding.is_grounded(),
            issues = quality.issues.len(),
            "Review complete"
        );
        Ok((quality, grounding))
    }
}
