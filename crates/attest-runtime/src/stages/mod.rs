//! Model-backed pipeline stages.
//!
//! Each stage builds a prompt, calls the model through the
//! [`ModelInvoker`](crate::invoke::ModelInvoker), and hands the response to
//! the deterministic rules in `attest-core`. Parse failures are absorbed by
//! the stage (empty extraction, unjudged verdicts, failed review); only
//! transport failures escape as [`StageError`].

mod composer;
mod extractor;
mod reviewer;
mod verifier;

pub use composer::AnswerComposer;
pub use extractor::RequirementExtractor;
pub use reviewer::QualityReviewer;
pub use verifier::GroundingVerifier;

use thiserror::Error;

use crate::invoke::InvokeError;
use crate::prompts::Stage;
use crate::providers::ProviderError;

/// Extraction and verification are pinned to deterministic sampling.
pub const EXTRACTION_TEMPERATURE: f32 = 0.0;
pub const VERIFICATION_TEMPERATURE: f32 = 0.0;

/// The model was unreachable for a stage.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} unavailable after {attempts} attempt(s): {source}")]
pub struct StageError {
    pub stage: Stage,
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// Separate a recoverable parse failure from a fatal transport failure.
///
/// Returns the parse detail so the caller can degrade, or the stage error.
fn parse_detail(err: InvokeError) -> Result<String, StageError> {
    match err {
        InvokeError::ParseFailure { stage, detail } => {
            tracing::warn!(stage = %stage, detail = %detail, "Model output could not be parsed");
            Ok(detail)
        }
        InvokeError::TransportFailure {
            stage,
            attempts,
            source,
        } => Err(StageError {
            stage,
            attempts,
            source,
        }),
    }
}
