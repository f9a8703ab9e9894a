//! Exponential backoff for transient failures.
//!
//! This is transport-level retrying only. The quality revision loop in the
//! orchestrator is a separate mechanism and never goes through here.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Backoff settings for model and store calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,

    #[serde(with = "crate::config::duration_text")]
    pub min_delay: Duration,

    #[serde(with = "crate::config::duration_text")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries; used in tests that exercise exhaustion.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay.max(self.min_delay))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Error that knows whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// An error plus the number of attempts made before giving up.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `operation`, retrying transient errors with exponential backoff.
///
/// `what` names the operation in retry logs.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = AtomicU32::new(0);

    let result = (|| {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    })
    .retry(policy.backoff())
    .sleep(tokio::time::sleep)
    .when(|e: &E| e.is_transient())
    .notify(|e: &E, delay: Duration| {
        tracing::warn!(
            operation = what,
            error = %e,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
    })
    .await;

    result.map_err(|error| Exhausted {
        error,
        attempts: attempts.load(Ordering::Relaxed),
    })
}
