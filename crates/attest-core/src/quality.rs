//! Quality scoring for composed answers.
//!
//! The reviewer model supplies raw criterion scores and issues; the pass
//! decision is made here, and grounding violations always force a fail.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::citations::GroundingReport;
use crate::types::{Criterion, QualityScore};

/// Minimum overall score for an answer to pass.
pub const DEFAULT_PASS_THRESHOLD: f64 = 7.0;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Scores as the reviewer model returns them, keyed by criterion name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewerScores {
    pub criteria_scores: BTreeMap<String, f64>,

    #[serde(default)]
    pub issues: Vec<String>,
}

/// Arithmetic mean of the criterion scores; 0.0 when empty.
pub fn mean_score(scores: &BTreeMap<Criterion, f64>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.values().sum::<f64>() / scores.len() as f64
}

impl QualityScore {
    /// Score one attempt from the reviewer's raw output plus the grounding check.
    pub fn assess(raw: ReviewerScores, grounding: &GroundingReport, threshold: f64) -> Self {
        let mut issues = raw.issues;

        for name in raw.criteria_scores.keys() {
            if Criterion::parse(name).is_none() {
                tracing::debug!(criterion = %name, "Ignoring unknown review criterion");
            }
        }

        let criteria_scores: BTreeMap<Criterion, f64> = Criterion::ALL
            .into_iter()
            .map(|criterion| {
                let score = raw
                    .criteria_scores
                    .iter()
                    .find(|(name, _)| Criterion::parse(name) == Some(criterion))
                    .map(|(_, score)| *score);
                match score {
                    Some(score) if score.is_finite() => (criterion, score.clamp(MIN_SCORE, MAX_SCORE)),
                    _ => {
                        issues.push(format!("Reviewer did not score {}", criterion));
                        (criterion, MIN_SCORE)
                    }
                }
            })
            .collect();

        Self::finish(criteria_scores, issues, grounding, threshold)
    }

    /// Automatic fail for a review that could not be parsed.
    pub fn unparsed(detail: &str, grounding: &GroundingReport, threshold: f64) -> Self {
        let criteria_scores = Criterion::ALL.into_iter().map(|c| (c, MIN_SCORE)).collect();
        let issues = vec![format!("Quality review could not be parsed: {}", detail)];
        Self::finish(criteria_scores, issues, grounding, threshold)
    }

    fn finish(
        criteria_scores: BTreeMap<Criterion, f64>,
        mut issues: Vec<String>,
        grounding: &GroundingReport,
        threshold: f64,
    ) -> Self {
        let overall_score = mean_score(&criteria_scores);
        issues.extend(grounding.violations());

        Self {
            passes: overall_score >= threshold && grounding.is_grounded(),
            criteria_scores,
            overall_score,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn uniform(score: f64) -> ReviewerScores {
        ReviewerScores {
            criteria_scores: Criterion::ALL
                .into_iter()
                .map(|c| (c.as_str().to_string(), score))
                .collect(),
            issues: vec![],
        }
    }

    #[test]
    fn test_passes_at_threshold() {
        let score = QualityScore::assess(uniform(7.0), &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);
        assert!(score.passes);
        assert_eq!(score.overall_score, 7.0);
    }

    #[test]
    fn test_fails_below_threshold() {
        let score = QualityScore::assess(uniform(6.5), &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);
        assert!(!score.passes);
    }

    #[test]
    fn test_grounding_violation_forces_fail() {
        let grounding = GroundingReport {
            unknown_citations: vec!["REQ-S009".to_string()],
            ..Default::default()
        };
        let score = QualityScore::assess(uniform(9.5), &grounding, DEFAULT_PASS_THRESHOLD);
        assert!(!score.passes);
        assert!(score.issues.iter().any(|i| i.contains("REQ-S009")));
    }

    #[test]
    fn test_missing_criterion_scores_zero_with_issue() {
        let mut raw = uniform(9.0);
        raw.criteria_scores.remove("citations");
        let score = QualityScore::assess(raw, &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);
        assert_eq!(score.criteria_scores[&Criterion::Citations], 0.0);
        assert!(score.issues.iter().any(|i| i.contains("citations")));
        assert_eq!(score.overall_score, 7.5);
    }

    #[test]
    fn test_scores_are_clamped() {
        let mut raw = uniform(8.0);
        raw.criteria_scores.insert("clarity".to_string(), 14.0);
        raw.criteria_scores.insert("accuracy".to_string(), -3.0);
        let score = QualityScore::assess(raw, &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);
        assert_eq!(score.criteria_scores[&Criterion::Clarity], 10.0);
        assert_eq!(score.criteria_scores[&Criterion::Accuracy], 0.0);
    }

    #[test]
    fn test_unparsed_review_fails() {
        let score = QualityScore::unparsed("expected value", &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);
        assert!(!score.passes);
        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.criteria_scores.len(), 6);
        assert!(score.issues[0].contains("could not be parsed"));
    }

    proptest! {
        #[test]
        fn prop_overall_is_bounded_mean(scores in proptest::collection::vec(-20.0f64..20.0, 6)) {
            let raw = ReviewerScores {
                criteria_scores: Criterion::ALL
                    .into_iter()
                    .zip(scores.iter())
                    .map(|(c, s)| (c.as_str().to_string(), *s))
                    .collect(),
                issues: vec![],
            };
            let score = QualityScore::assess(raw, &GroundingReport::default(), DEFAULT_PASS_THRESHOLD);

            let expected = scores.iter().map(|s| s.clamp(0.0, 10.0)).sum::<f64>() / 6.0;
            prop_assert!((score.overall_score - expected).abs() < 1e-9);
            prop_assert!((0.0..=10.0).contains(&score.overall_score));
            prop_assert_eq!(score.passes, score.overall_score >= DEFAULT_PASS_THRESHOLD);
        }
    }
}
