//! Token usage accounting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::prompts::Stage;
use crate::providers::TokenUsage;

/// Accumulated model usage for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Successful model calls
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,

    pub calls_by_stage: BTreeMap<Stage, u32>,
}

impl LlmUsage {
    pub fn add(&mut self, stage: Stage, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        *self.calls_by_stage.entry(stage).or_insert(0) += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Fold another run's usage into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
        for (stage, calls) in &other.calls_by_stage {
            *self.calls_by_stage.entry(*stage).or_insert(0) += calls;
        }
    }

    pub fn calls_for(&self, stage: Stage) -> u32 {
        self.calls_by_stage.get(&stage).copied().unwrap_or(0)
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("opus") => (15.0, 75.0),
            m if m.contains("haiku") => (1.0, 5.0),
            _ => (3.0, 15.0),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;

        input_cost + output_cost
    }
}

/// Thread-safe usage accumulator shared by the stages of one run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: Stage, usage: &TokenUsage, model: &str) {
        self.usage.write().add(stage, usage, model);
    }

    pub fn absorb(&self, other: &LlmUsage) {
        self.usage.write().merge(other);
    }

    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }
}
