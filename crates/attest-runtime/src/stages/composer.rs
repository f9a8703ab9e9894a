//! Answer composition.

use attest_core::{assemble_answer, Attempt, ComposedAnswer, ExtractedRequirement};

use super::{parse_detail, StageError};
use crate::invoke::ModelInvoker;
use crate::prompts::{composition_request, Stage};

pub struct AnswerComposer<'a> {
    invoker: &'a ModelInvoker,
    temperature: f32,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(invoker: &'a ModelInvoker, temperature: f32) -> Self {
        Self {
            invoker,
            temperature,
        }
    }

    /// Write an answer from verified requirements only. On a revision,
    /// `prior` carries the rejected attempt and its reviewer issues.
    pub async fn compose(
        &self,
        question: &str,
        verified: &[ExtractedRequirement],
        prior: Option<&Attempt>,
    ) -> Result<ComposedAnswer, StageError> {
        if verified.is_empty() {
            tracing::warn!("Composition requested without verified requirements");
            return Ok(assemble_answer("", verified));
        }

        let prompt = composition_request(question, verified, prior);
        let text = match self
            .invoker
            .invoke(Stage::Composition, &prompt, self.temperature)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                parse_detail(err)?;
                String::new()
            }
        };

        let composed = assemble_answer(&text, verified);
        tracing::info!(
            used = verified.len() - composed.unused_requirements.len(),
            unused = composed.unused_requirements.len(),
            confidence = %composed.composition_confidence,
            "Composition complete"
        );
        Ok(composed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::RetryPolicy;
    use crate::testing::{invoker, requirement, ScriptedProvider};
    use attest_core::{CompositionConfidence, GroundingReport, QualityScore, SourceType};
    use std::sync::Arc;

    fn verified() -> Vec<ExtractedRequirement> {
        vec![
            requirement("REQ-S001", SourceType::Statute, "Counties shall submit annual reports by March 1."),
            requirement("REQ-P001", SourceType::Policy, "Each county must file its annual report using form DR-7."),
        ]
    }

    #[tokio::test]
    async fn test_confidence_follows_markers() {
        let provider = Arc::new(ScriptedProvider::new().respond(
            Stage::Composition,
            "Counties must submit annual reports by March 1 [REQ-S001].",
        ));
        let invoker = invoker(provider, RetryPolicy::none());

        let composed = AnswerComposer::new(&invoker, 0.2)
            .compose("When must counties report?", &verified(), None)
            .await
            .unwrap();

        assert_eq!(composed.composition_confidence, CompositionConfidence::Low);
        assert_eq!(composed.unused_requirements, vec!["REQ-P001".to_string()]);
    }

    #[tokio::test]
    async fn test_revision_prompt_carries_issues() {
        let provider = Arc::new(ScriptedProvider::new().respond(
            Stage::Composition,
            "Counties must report by March 1 [REQ-S001] on form DR-7 [REQ-P001].",
        ));
        let invoker = invoker(provider.clone(), RetryPolicy::none());

        let prior = Attempt {
            attempt: 1,
            composed: assemble_answer("Counties report yearly.", &verified()),
            quality: QualityScore::unparsed("truncated", &GroundingReport::default(), 7.0),
            grounding: GroundingReport::default(),
        };

        let composed = AnswerComposer::new(&invoker, 0.2)
            .compose("When must counties report?", &verified(), Some(&prior))
            .await
            .unwrap();

        assert_eq!(composed.composition_confidence, CompositionConfidence::Medium);
        let request = &provider.requests(Stage::Composition)[0];
        assert!(request.contains("Counties report yearly."));
        assert!(request.contains("Quality review could not be parsed: truncated"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_insufficient() {
        let provider = Arc::new(ScriptedProvider::new().respond(Stage::Composition, "   "));
        let invoker = invoker(provider, RetryPolicy::none());

        let composed = AnswerComposer::new(&invoker, 0.2)
            .compose("When must counties report?", &verified(), None)
            .await
            .unwrap();

        assert!(composed.final_answer.is_empty());
        assert_eq!(composed.composition_confidence, CompositionConfidence::Insufficient);
    }
}
