//! Scripted doubles for the model and the chunk store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use attest_core::{Chunk, ExtractedRequirement, ExtractionConfidence, SourceType};

use crate::invoke::ModelInvoker;
use crate::prompts::Stage;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::resilience::{RetryPolicy, UsageTracker};
use crate::store::{ChunkStore, StoreError};

struct Scripted {
    /// Only answers prompts containing this text
    needle: Option<String>,
    reply: Result<String, ProviderError>,
}

#[derive(Default)]
struct Script {
    queues: HashMap<Stage, VecDeque<Scripted>>,
    fallbacks: HashMap<Stage, String>,
    requests: HashMap<Stage, Vec<String>>,
}

/// Replays canned replies per stage, in order.
///
/// The stage is recognised from the system prompt. When a stage's queue is
/// empty the fallback reply (if any) is used, otherwise the call fails with
/// `NotConfigured`.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, stage: Stage, needle: Option<&str>, reply: Result<String, ProviderError>) -> Self {
        self.script
            .lock()
            .queues
            .entry(stage)
            .or_default()
            .push_back(Scripted {
                needle: needle.map(str::to_string),
                reply,
            });
        self
    }

    pub fn respond(self, stage: Stage, text: &str) -> Self {
        self.push(stage, None, Ok(text.to_string()))
    }

    /// Reply only to a request whose user prompt contains `needle`.
    pub fn respond_when(self, stage: Stage, needle: &str, text: &str) -> Self {
        self.push(stage, Some(needle), Ok(text.to_string()))
    }

    pub fn fail(self, stage: Stage, error: ProviderError) -> Self {
        self.push(stage, None, Err(error))
    }

    pub fn with_fallback(self, stage: Stage, text: &str) -> Self {
        self.script.lock().fallbacks.insert(stage, text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.script.lock().requests.get(&stage).map_or(0, Vec::len)
    }

    /// User prompts received for a stage, in arrival order.
    pub fn requests(&self, stage: Stage) -> Vec<String> {
        self.script
            .lock()
            .requests
            .get(&stage)
            .cloned()
            .unwrap_or_default()
    }

    fn next_reply(&self, stage: Stage, prompt: &str) -> Result<String, ProviderError> {
        let mut script = self.script.lock();
        script
            .requests
            .entry(stage)
            .or_default()
            .push(prompt.to_string());

        if let Some(queue) = script.queues.get_mut(&stage) {
            let position = queue.iter().position(|s| {
                s.needle
                    .as_deref()
                    .map_or(true, |needle| prompt.contains(needle))
            });
            if let Some(entry) = position.and_then(|i| queue.remove(i)) {
                return entry.reply;
            }
        }

        script
            .fallbacks
            .get(&stage)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(format!("no scripted reply for {}", stage)))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let stage = Stage::from_system_prompt(system)
            .ok_or_else(|| ProviderError::NotConfigured("unrecognised system prompt".to_string()))?;
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let content = self.next_reply(stage, &prompt)?;
        Ok(CompletionResponse {
            usage: TokenUsage {
                prompt_tokens: self.estimate_tokens(&prompt),
                completion_tokens: self.estimate_tokens(&content),
            },
            content,
            model: config.model.clone(),
            stop_reason: Some("end_turn".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Serves the same chunks for every query.
#[derive(Default)]
pub struct FixedChunkStore {
    chunks: Vec<Chunk>,
    searches: AtomicUsize,
}

impl FixedChunkStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for FixedChunkStore {
    async fn search(
        &self,
        _query: &str,
        source_type: SourceType,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<Vec<Chunk>, StoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chunks
            .iter()
            .filter(|c| c.source_type == source_type)
            .filter(|c| c.similarity_score >= similarity_threshold)
            .take(top_k)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// A search backend that is always down.
#[derive(Default)]
pub struct FailingStore {
    searches: AtomicUsize,
}

impl FailingStore {
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for FailingStore {
    async fn search(
        &self,
        _query: &str,
        _source_type: SourceType,
        _top_k: usize,
        _similarity_threshold: f64,
    ) -> Result<Vec<Chunk>, StoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn chunk(id: &str, source_type: SourceType, text: &str) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        source_type,
        document_id: format!("{} document {}", source_type, id),
        section_heading: "General".to_string(),
        text: text.to_string(),
        similarity_score: 0.8,
    }
}

pub fn requirement(id: &str, source_type: SourceType, quote: &str) -> ExtractedRequirement {
    ExtractedRequirement {
        requirement_id: id.to_string(),
        source_type,
        document_id: format!("{} document", source_type),
        section_heading: "General".to_string(),
        exact_quote: quote.to_string(),
        chunk_id: format!("{}1", source_type.prefix()),
        extraction_confidence: ExtractionConfidence::High,
    }
}

pub fn invoker(provider: Arc<ScriptedProvider>, retry: RetryPolicy) -> ModelInvoker {
    ModelInvoker::new(
        provider,
        "claude-sonnet-4-5",
        512,
        Duration::from_millis(500),
        retry,
        Arc::new(UsageTracker::new()),
    )
}

pub fn fast_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}
