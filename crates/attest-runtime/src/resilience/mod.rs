//! Resilience for external calls.
//!
//! - Retry with exponential backoff for transient failures
//! - Token usage accounting

mod retry;
mod usage;

pub use retry::{retry_transient, Exhausted, RetryPolicy, Transient};
pub use usage::{LlmUsage, UsageTracker};
