//! JSON Schema validation for structured model output.
//!
//! Each stage that expects JSON from the model validates it against an
//! embedded schema before deserializing. Validators compile once and are
//! reused across runs.

use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

const EXTRACTION_SCHEMA_JSON: &str = include_str!("../schemas/extraction.schema.json");
const CANDIDATE_SCHEMA_JSON: &str = include_str!("../schemas/requirement_candidate.schema.json");
const VERIFICATION_SCHEMA_JSON: &str = include_str!("../schemas/verification.schema.json");
const VERDICT_SCHEMA_JSON: &str = include_str!("../schemas/criteria_verdict.schema.json");
const REVIEW_SCHEMA_JSON: &str = include_str!("../schemas/review.schema.json");

type CompiledSchema = OnceLock<Result<jsonschema::Validator, String>>;

static EXTRACTION_SCHEMA: CompiledSchema = OnceLock::new();
static CANDIDATE_SCHEMA: CompiledSchema = OnceLock::new();
static VERIFICATION_SCHEMA: CompiledSchema = OnceLock::new();
static VERDICT_SCHEMA: CompiledSchema = OnceLock::new();
static REVIEW_SCHEMA: CompiledSchema = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// The shapes of JSON the pipeline asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOutputKind {
    /// `{"requirements": [...]}`; items are checked one by one
    Extraction,
    RequirementCandidate,
    /// `{"verdicts": [...]}`; items are checked one by one
    Verification,
    CriteriaVerdict,
    Review,
}

impl ModelOutputKind {
    fn schema(&self) -> (&'static CompiledSchema, &'static str) {
        match self {
            ModelOutputKind::Extraction => (&EXTRACTION_SCHEMA, EXTRACTION_SCHEMA_JSON),
            ModelOutputKind::RequirementCandidate => (&CANDIDATE_SCHEMA, CANDIDATE_SCHEMA_JSON),
            ModelOutputKind::Verification => (&VERIFICATION_SCHEMA, VERIFICATION_SCHEMA_JSON),
            ModelOutputKind::CriteriaVerdict => (&VERDICT_SCHEMA, VERDICT_SCHEMA_JSON),
            ModelOutputKind::Review => (&REVIEW_SCHEMA, REVIEW_SCHEMA_JSON),
        }
    }
}

fn get_validator(kind: ModelOutputKind) -> Result<&'static jsonschema::Validator, SchemaError> {
    let (cell, source) = kind.schema();
    let result = cell.get_or_init(|| {
        let schema_value: Value = match serde_json::from_str(source) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate model output against the schema for `kind`.
///
/// Returns every validation error, each with its instance path.
pub fn validate_model_output(kind: ModelOutputKind, value: &Value) -> Result<(), Vec<String>> {
    let validator = get_validator(kind).map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Pull the first JSON object out of a model response.
///
/// Models wrap JSON in prose or code fences often enough that the object is
/// taken from the first `{` to the last `}`.
pub fn parse_model_json(text: &str) -> Result<Value, String> {
    let start = text.find('{').ok_or_else(|| "response contains no JSON object".to_string())?;
    let end = text.rfind('}').ok_or_else(|| "response contains no JSON object".to_string())?;
    if end < start {
        return Err("response contains no JSON object".to_string());
    }

    serde_json::from_str(&text[start..=end]).map_err(|e| format!("invalid JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_schemas_compile() {
        for kind in [
            ModelOutputKind::Extraction,
            ModelOutputKind::RequirementCandidate,
            ModelOutputKind::Verification,
            ModelOutputKind::CriteriaVerdict,
            ModelOutputKind::Review,
        ] {
            assert!(get_validator(kind).is_ok(), "{:?} failed to compile", kind);
        }
    }

    #[test]
    fn test_candidate_schema() {
        let valid = json!({"chunk_id": "S1", "exact_quote": "Counties shall report.", "confidence": "high"});
        assert!(validate_model_output(ModelOutputKind::RequirementCandidate, &valid).is_ok());

        let missing_quote = json!({"chunk_id": "S1"});
        assert!(validate_model_output(ModelOutputKind::RequirementCandidate, &missing_quote).is_err());

        let bad_confidence = json!({"chunk_id": "S1", "exact_quote": "x", "confidence": "certain"});
        assert!(validate_model_output(ModelOutputKind::RequirementCandidate, &bad_confidence).is_err());
    }

    #[test]
    fn test_verdict_schema_reports_path() {
        let value = json!({"requirement_id": "REQ-S001", "addresses_question": "yes",
                           "supported_by_quote": true, "complete_quote": true});
        let errors = validate_model_output(ModelOutputKind::CriteriaVerdict, &value).unwrap_err();
        assert!(errors[0].contains("/addresses_question"), "{:?}", errors);
    }

    #[test]
    fn test_verification_schema_leaves_items_to_verdict_schema() {
        let value = json!({"verdicts": [{"requirement_id": "REQ-S001"}]});
        assert!(validate_model_output(ModelOutputKind::Verification, &value).is_ok());
        assert!(validate_model_output(ModelOutputKind::Verification, &json!({"verdicts": "ok"})).is_err());
    }

    #[test]
    fn test_review_schema() {
        let valid = json!({"criteria_scores": {"clarity": 8, "accuracy": 7.5}, "issues": []});
        assert!(validate_model_output(ModelOutputKind::Review, &valid).is_ok());

        let invalid = json!({"criteria_scores": {"clarity": "high"}});
        assert!(validate_model_output(ModelOutputKind::Review, &invalid).is_err());
    }

    #[test]
    fn test_parse_model_json_tolerates_wrapping() {
        let text = "Here is the result:\n```json\n{\"verdicts\": []}\n```\n";
        assert_eq!(parse_model_json(text).unwrap(), json!({"verdicts": []}));
    }

    #[test]
    fn test_parse_model_json_failures() {
        assert!(parse_model_json("no json here").is_err());
        assert!(parse_model_json("} backwards {").is_err());
        assert!(parse_model_json("{not json}").is_err());
    }
}
