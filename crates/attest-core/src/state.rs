//! Pipeline state machine.
//!
//! ```text
//! RETRIEVE -> EXTRACT -> VERIFY -> NO_EVIDENCE
//!                               \-> COMPOSE -> REVIEW -> FINALIZE
//!                                      ^          |
//!                                      \----------/  (fail, revisions remain)
//! ```
//!
//! `advance` is pure; the orchestrator owns the counters it is fed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Retrieve,
    Extract,
    Verify,
    Compose,
    Review,
    NoEvidence,
    Finalize,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::NoEvidence | PipelineState::Finalize)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Retrieve => "RETRIEVE",
            PipelineState::Extract => "EXTRACT",
            PipelineState::Verify => "VERIFY",
            PipelineState::Compose => "COMPOSE",
            PipelineState::Review => "REVIEW",
            PipelineState::NoEvidence => "NO_EVIDENCE",
            PipelineState::Finalize => "FINALIZE",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed stage reports back to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    Retrieved,
    Extracted,
    Verified {
        verified_count: usize,
    },
    Composed,
    Reviewed {
        passes: bool,
        revision_count: u32,
        max_revisions: u32,
    },
}

impl StageSignal {
    fn name(&self) -> &'static str {
        match self {
            StageSignal::Retrieved => "retrieved",
            StageSignal::Extracted => "extracted",
            StageSignal::Verified { .. } => "verified",
            StageSignal::Composed => "composed",
            StageSignal::Reviewed { .. } => "reviewed",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{0} is terminal")]
    Terminal(PipelineState),

    #[error("signal '{signal}' is not valid in state {state}")]
    Illegal {
        state: PipelineState,
        signal: &'static str,
    },
}

impl PipelineState {
    /// Compute the next state.
    pub fn advance(self, signal: &StageSignal) -> Result<PipelineState, TransitionError> {
        use PipelineState::*;

        if self.is_terminal() {
            return Err(TransitionError::Terminal(self));
        }

        let next = match (self, *signal) {
            (Retrieve, StageSignal::Retrieved) => Extract,
            (Extract, StageSignal::Extracted) => Verify,
            (Verify, StageSignal::Verified { verified_count: 0 }) => NoEvidence,
            (Verify, StageSignal::Verified { .. }) => Compose,
            (Compose, StageSignal::Composed) => Review,
            (
                Review,
                StageSignal::Reviewed {
                    passes,
                    revision_count,
                    max_revisions,
                },
            ) => {
                if passes || revision_count >= max_revisions {
                    Finalize
                } else {
                    Compose
                }
            }
            (state, signal) => {
                return Err(TransitionError::Illegal {
                    state,
                    signal: signal.name(),
                })
            }
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reviewed(passes: bool, revision_count: u32) -> StageSignal {
        StageSignal::Reviewed {
            passes,
            revision_count,
            max_revisions: 2,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut state = PipelineState::Retrieve;
        for signal in [
            StageSignal::Retrieved,
            StageSignal::Extracted,
            StageSignal::Verified { verified_count: 1 },
            StageSignal::Composed,
            reviewed(true, 0),
        ] {
            state = state.advance(&signal).unwrap();
        }
        assert_eq!(state, PipelineState::Finalize);
    }

    #[test]
    fn test_empty_verified_set_is_no_evidence() {
        let next = PipelineState::Verify
            .advance(&StageSignal::Verified { verified_count: 0 })
            .unwrap();
        assert_eq!(next, PipelineState::NoEvidence);
        assert!(next.is_terminal());
    }

    #[test]
    fn test_failed_review_retries_until_cap() {
        assert_eq!(PipelineState::Review.advance(&reviewed(false, 0)).unwrap(), PipelineState::Compose);
        assert_eq!(PipelineState::Review.advance(&reviewed(false, 1)).unwrap(), PipelineState::Compose);
        assert_eq!(PipelineState::Review.advance(&reviewed(false, 2)).unwrap(), PipelineState::Finalize);
    }

    #[test]
    fn test_illegal_transitions() {
        assert_eq!(
            PipelineState::Retrieve.advance(&StageSignal::Composed),
            Err(TransitionError::Illegal {
                state: PipelineState::Retrieve,
                signal: "composed",
            })
        );
        assert_eq!(
            PipelineState::Finalize.advance(&StageSignal::Retrieved),
            Err(TransitionError::Terminal(PipelineState::Finalize))
        );
    }

    #[test]
    fn test_state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&PipelineState::NoEvidence).unwrap();
        assert_eq!(json, "\"NO_EVIDENCE\"");
    }

    proptest! {
        /// Driving the review loop with any sequence of failures always
        /// terminates within `max_revisions` recompositions.
        #[test]
        fn prop_revision_loop_is_bounded(max_revisions in 0u32..6, outcomes in proptest::collection::vec(any::<bool>(), 0..20)) {
            let mut state = PipelineState::Compose;
            let mut revision_count = 0u32;
            let mut outcomes = outcomes.into_iter();

            while !state.is_terminal() {
                state = match state {
                    PipelineState::Compose => state.advance(&StageSignal::Composed).unwrap(),
                    PipelineState::Review => {
                        let passes = outcomes.next().unwrap_or(false);
                        let next = state.advance(&StageSignal::Reviewed { passes, revision_count, max_revisions }).unwrap();
                        if next == PipelineState::Compose {
                            revision_count += 1;
                        }
                        next
                    }
                    other => panic!("unexpected state {other}"),
                };
                prop_assert!(revision_count <= max_revisions);
            }
            prop_assert_eq!(state, PipelineState::Finalize);
        }
    }
}
