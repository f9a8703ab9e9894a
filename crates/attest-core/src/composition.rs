//! Deterministic bookkeeping for composed answers.
//!
//! The composer model only writes prose. Which requirements were used, which
//! were left out, and how confident the answer is all follow from the
//! `[REQ-ID]` markers actually present in that prose.

use crate::citations::cited_ids;
use crate::types::{ComposedAnswer, CompositionConfidence, ExtractedRequirement, RequirementReference};

/// Remove a surrounding Markdown code fence, if the model added one.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("```markdown") along with the opening fence
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Build a `ComposedAnswer` from the composer's raw text.
pub fn assemble_answer(raw_text: &str, verified: &[ExtractedRequirement]) -> ComposedAnswer {
    let final_answer = strip_code_fences(raw_text).to_string();
    let cited = cited_ids(&final_answer);

    let requirement_references: Vec<RequirementReference> = verified
        .iter()
        .map(|r| RequirementReference {
            requirement_id: r.requirement_id.clone(),
            used_in_answer: cited.contains(&r.requirement_id),
        })
        .collect();

    let unused_requirements: Vec<String> = requirement_references
        .iter()
        .filter(|r| !r.used_in_answer)
        .map(|r| r.requirement_id.clone())
        .collect();

    let used = requirement_references.len() - unused_requirements.len();

    ComposedAnswer {
        final_answer,
        requirement_references,
        unused_requirements,
        composition_confidence: CompositionConfidence::from_used_count(used),
    }
}
