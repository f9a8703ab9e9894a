//! Prompts for the four model-backed stages.
//!
//! Each stage gets a fixed system prompt (shared evidence rules plus a
//! stage-specific section) and a user message built from the run's
//! artifacts. The system prompts never contain run data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

use attest_core::{Attempt, Chunk, ComposedAnswer, ExtractedRequirement};

/// A model-backed pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Verification,
    Composition,
    Review,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Extraction,
        Stage::Verification,
        Stage::Composition,
        Stage::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Verification => "verification",
            Stage::Composition => "composition",
            Stage::Review => "review",
        }
    }

    /// Header line that opens this stage's system prompt.
    pub fn header(&self) -> &'static str {
        match self {
            Stage::Extraction => "## Stage: Requirement Extraction",
            Stage::Verification => "## Stage: Grounding Verification",
            Stage::Composition => "## Stage: Answer Composition",
            Stage::Review => "## Stage: Quality Review",
        }
    }

    /// Identify the stage a system prompt belongs to.
    pub fn from_system_prompt(prompt: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| prompt.contains(s.header()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules shared by every stage.
pub const EVIDENCE_RULES_PROMPT: &str = r#"
You are part of a compliance evidence pipeline for government policy questions.

Answers are built only from the literal text of statutes and policy manuals.
You never add facts, never rely on general knowledge of the law, and never
resolve ambiguity by guessing. When the text does not say it, the answer
does not say it.

## Evidence Rules
1. Source text is authoritative; your paraphrase is not
2. A requirement is a sentence that uses must, shall, required, prohibited or mandated
3. Quotes are copied character for character, never reworded
4. Refusing to answer is better than answering without evidence
"#;

pub const EXTRACTION_PROMPT: &str = r#"
## Stage: Requirement Extraction

Find sentences in the numbered passages that state a requirement relevant to
the question.

Rules:
- Copy each quote exactly from ONE passage; do not join text across passages
- Only quote sentences containing must, shall, required, prohibited or mandated
- Keep quotes between 10 and 40 words; quote the whole sentence when it is shorter
- Skip background, history and definitions that impose no obligation
- If a passage states no requirement relevant to the question, return nothing for it

## Output Format (JSON only)
{
  "requirements": [
    {
      "chunk_id": "S1",
      "exact_quote": "verbatim text from the passage",
      "confidence": "high" | "medium" | "low"
    }
  ]
}
"#;

pub const VERIFICATION_PROMPT: &str = r#"
## Stage: Grounding Verification

For each requirement, answer three independent questions about its quote:

1. addresses_question: Does the quote directly answer the question asked?
   Being on the same topic is not enough.
2. supported_by_quote: Can the answer be proven from this quote alone,
   with no outside inference?
3. complete_quote: Is the quote self-contained, without depending on a
   cross-referenced section that is not quoted?

Judge each requirement on its own quote only. Return one verdict per
requirement ID you were given.

## Output Format (JSON only)
{
  "verdicts": [
    {
      "requirement_id": "REQ-S001",
      "addresses_question": true,
      "supported_by_quote": true,
      "complete_quote": true,
      "rationale": "one sentence"
    }
  ]
}
"#;

pub const COMPOSITION_PROMPT: &str = r#"
## Stage: Answer Composition

Write the answer to the question using ONLY the verified requirements listed.

Rules:
- Every sentence must end with the ID of the requirement it rests on, in
  square brackets: [REQ-S001]. Group several as [REQ-S001, REQ-P002]
- Cite only the requirement IDs listed; never invent an ID
- Add no facts, deadlines or conditions that are not in the quotes
- If two requirements conflict, present both and cite each
- Plain prose or a short list; no headings, no preamble, no closing remarks

Return the answer text only.
"#;

pub const REVIEW_PROMPT: &str = r#"
## Stage: Quality Review

Score the answer from 0 to 10 on each criterion:
- completeness: covers everything the verified requirements say about the question
- accuracy: says only what the quotes say
- actionability: a caseworker could act on it
- clarity: plain, unambiguous language
- consistency: no internal contradictions
- citations: every sentence carries a correct [REQ-ID]

List each concrete problem as an issue the writer can fix.

## Output Format (JSON only)
{
  "criteria_scores": {
    "completeness": 0-10,
    "accuracy": 0-10,
    "actionability": 0-10,
    "clarity": 0-10,
    "consistency": 0-10,
    "citations": 0-10
  },
  "issues": ["specific, fixable problem"]
}
"#;

/// Full system prompt for a stage.
pub fn system_prompt(stage: Stage) -> String {
    let section = match stage {
        Stage::Extraction => EXTRACTION_PROMPT,
        Stage::Verification => VERIFICATION_PROMPT,
        Stage::Composition => COMPOSITION_PROMPT,
        Stage::Review => REVIEW_PROMPT,
    };
    format!("{}{}", EVIDENCE_RULES_PROMPT, section)
}

fn push_question(out: &mut String, question: &str) {
    let _ = writeln!(out, "Question: {}\n", question.trim());
}

fn push_requirements(out: &mut String, requirements: &[ExtractedRequirement]) {
    for r in requirements {
        let _ = writeln!(
            out,
            "[{}] {} - {}\n\"{}\"\n",
            r.requirement_id, r.document_id, r.section_heading, r.exact_quote
        );
    }
}

pub fn extraction_request(question: &str, chunks: &[&Chunk]) -> String {
    let mut out = String::new();
    push_question(&mut out, question);
    out.push_str("Passages:\n\n");
    for chunk in chunks {
        let _ = writeln!(
            out,
            "<passage id=\"{}\" source=\"{}\" document=\"{}\" section=\"{}\">\n{}\n</passage>\n",
            chunk.chunk_id,
            chunk.source_type,
            chunk.document_id,
            chunk.section_heading,
            chunk.text.trim()
        );
    }
    out
}

pub fn verification_request(question: &str, requirements: &[ExtractedRequirement]) -> String {
    let mut out = String::new();
    push_question(&mut out, question);
    out.push_str("Requirements:\n\n");
    push_requirements(&mut out, requirements);
    out
}

/// Composition request; on a revision, carries the previous answer and every
/// issue the reviewer raised.
pub fn composition_request(
    question: &str,
    verified: &[ExtractedRequirement],
    prior: Option<&Attempt>,
) -> String {
    let mut out = String::new();
    push_question(&mut out, question);
    out.push_str("Verified requirements:\n\n");
    push_requirements(&mut out, verified);

    if let Some(prior) = prior {
        let _ = writeln!(
            out,
            "Your previous answer (attempt {}) was rejected:\n\n{}\n",
            prior.attempt,
            prior.composed.final_answer.trim()
        );
        out.push_str("Fix every issue below:\n");
        for issue in &prior.quality.issues {
            let _ = writeln!(out, "- {}", issue);
        }
    }
    out
}

pub fn review_request(
    question: &str,
    composed: &ComposedAnswer,
    verified: &[ExtractedRequirement],
) -> String {
    let mut out = String::new();
    push_question(&mut out, question);
    out.push_str("Verified requirements:\n\n");
    push_requirements(&mut out, verified);
    let _ = writeln!(out, "Answer to review:\n\n{}", composed.final_answer.trim());
    out
}
