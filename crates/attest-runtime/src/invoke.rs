//! The model invocation primitive.
//!
//! `invoke(prompt, temperature, timeout) -> text | ParseFailure | TransportFailure`.
//! Every call gets a per-attempt timeout and bounded exponential backoff over
//! retryable provider errors. Token usage is recorded per stage.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use attest_core::schema::{parse_model_json, validate_model_output, ModelOutputKind};

use crate::prompts::{system_prompt, Stage};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{retry_transient, RetryPolicy, Transient, UsageTracker};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    /// The model answered, but not in the shape asked for
    #[error("{stage} output could not be parsed: {detail}")]
    ParseFailure { stage: Stage, detail: String },

    /// The model could not be reached
    #[error("{stage} call failed after {attempts} attempt(s): {source}")]
    TransportFailure {
        stage: Stage,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Wraps a provider with timeouts, retries and usage accounting.
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    retry: RetryPolicy,
    usage: Arc<UsageTracker>,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelInvoker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
        retry: RetryPolicy,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            timeout,
            retry,
            usage,
        }
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Send one prompt and return the raw text.
    pub async fn invoke(
        &self,
        stage: Stage,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, InvokeError> {
        let config = CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature,
            timeout: self.timeout,
        };
        let system = system_prompt(stage);

        let result = retry_transient(&self.retry, stage.as_str(), || {
            let messages = vec![ChatMessage::system(system.clone()), ChatMessage::user(prompt)];
            let config = &config;
            async move {
                match tokio::time::timeout(config.timeout, self.provider.complete(messages, config)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(config.timeout)),
                }
            }
        })
        .await;

        match result {
            Ok(response) => {
                self.usage.record(stage, &response.usage, &response.model);
                tracing::debug!(
                    stage = %stage,
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    "Model call complete"
                );
                Ok(response.content)
            }
            Err(exhausted) => {
                tracing::warn!(
                    stage = %stage,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "Model call failed"
                );
                Err(InvokeError::TransportFailure {
                    stage,
                    attempts: exhausted.attempts,
                    source: exhausted.error,
                })
            }
        }
    }

    /// Invoke and return the JSON object in the response, validated against
    /// the schema for `kind`.
    pub async fn invoke_json(
        &self,
        stage: Stage,
        prompt: &str,
        temperature: f32,
        kind: ModelOutputKind,
    ) -> Result<Value, InvokeError> {
        let text = self.invoke(stage, prompt, temperature).await?;
        let parse_failure = |detail: String| InvokeError::ParseFailure { stage, detail };

        let value = parse_model_json(&text).map_err(parse_failure)?;
        validate_model_output(kind, &value).map_err(|errors| parse_failure(errors.join("; ")))?;
        Ok(value)
    }

    /// Invoke, validate, and deserialize into `T`.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        stage: Stage,
        prompt: &str,
        temperature: f32,
        kind: ModelOutputKind,
    ) -> Result<T, InvokeError> {
        let value = self.invoke_json(stage, prompt, temperature, kind).await?;
        serde_json::from_value(value).map_err(|e| InvokeError::ParseFailure {
            stage,
            detail: e.to_string(),
        })
    }
}
