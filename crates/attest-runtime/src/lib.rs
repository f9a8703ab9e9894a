//! # attest-runtime
//!
//! LLM-backed evidence pipeline for Attest.
//!
//! The deterministic rules live in `attest-core`. This crate adds what needs
//! a network: the model provider, the chunk store, the four model-backed
//! stages, and the orchestrator that runs them through the state machine.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use attest_runtime::{InMemoryChunkStore, PipelineOrchestrator, RuntimeConfig};
//!
//! let orchestrator = PipelineOrchestrator::builder()
//!     .provider(provider)
//!     .store(Arc::new(InMemoryChunkStore::from_file("corpus.yaml")?))
//!     .config(RuntimeConfig::from_file("attest.yaml")?)
//!     .build()?;
//!
//! let run = orchestrator.run("When must counties report?", None).await?;
//! println!("{:?}", run.outcome);
//! ```

pub mod audit;
pub mod config;
pub mod invoke;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod run;
pub mod stages;
pub mod store;

#[cfg(test)]
mod testing;

pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{ConfigError, RuntimeConfig};
pub use invoke::{InvokeError, ModelInvoker};
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineOrchestratorBuilder};
pub use prompts::Stage;
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{LlmUsage, RetryPolicy};
pub use run::PipelineRun;
pub use stages::StageError;
pub use store::{ChunkStore, CorpusPassage, InMemoryChunkStore, StoreError};
