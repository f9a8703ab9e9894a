//! Attest CLI: grounded answers to compliance questions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use attest_core::Outcome;
use attest_runtime::{
    InMemoryChunkStore, PipelineOrchestrator, PipelineRun, ProviderRegistry, RuntimeConfig,
};

/// Answer compliance questions from statutes and policy manuals, citing
/// every claim.
#[derive(Parser, Debug)]
#[command(name = "attest", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question from a corpus
    Ask {
        /// The compliance question
        question: String,

        /// Corpus file (YAML or JSON) of statute and policy passages
        #[arg(long)]
        corpus: PathBuf,

        /// Runtime configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Topic hint appended to the retrieval query
        #[arg(long)]
        topic: Option<String>,

        /// Print the full run record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a runtime configuration file
    CheckConfig {
        file: PathBuf,
    },
}

const EXIT_NO_EVIDENCE: u8 = 2;
const EXIT_UNAVAILABLE: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ask {
            question,
            corpus,
            config,
            topic,
            json,
        } => ask(&question, &corpus, config.as_deref(), topic.as_deref(), json).await,
        Command::CheckConfig { file } => check_config(&file),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

async fn ask(
    question: &str,
    corpus: &std::path::Path,
    config_path: Option<&std::path::Path>,
    topic: Option<&str>,
    json: bool,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;

    let store = InMemoryChunkStore::from_file(corpus)
        .with_context(|| format!("Failed to load corpus {}", corpus.display()))?
        .with_overfetch_factor(config.pipeline.overfetch_factor);
    tracing::info!(passages = store.len(), "Corpus loaded");

    let provider = ProviderRegistry::with_defaults()
        .create(&config.provider.provider_type, &config.provider.settings)
        .context("Failed to create LLM provider")?;

    let orchestrator = PipelineOrchestrator::builder()
        .provider(provider)
        .store(Arc::new(store))
        .config(config)
        .build()?;

    let run = orchestrator.run(question, topic).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }

    Ok(match run.outcome {
        Outcome::Finalized { .. } => ExitCode::SUCCESS,
        Outcome::NoEvidence { .. } => ExitCode::from(EXIT_NO_EVIDENCE),
        Outcome::Unavailable { .. } => ExitCode::from(EXIT_UNAVAILABLE),
    })
}

fn print_run(run: &PipelineRun) {
    match &run.outcome {
        Outcome::Finalized {
            final_answer,
            citations,
            confidence,
            passes,
            grounding_violations,
        } => {
            println!("{}\n", final_answer);
            println!("Sources:");
            for requirement in run
                .verified_requirements
                .iter()
                .filter(|r| citations.contains(&r.requirement_id))
            {
                println!(
                    "  [{}] {} - {}\n      \"{}\"",
                    requirement.requirement_id,
                    requirement.document_id,
                    requirement.section_heading,
                    requirement.exact_quote
                );
            }
            println!();
            println!(
                "Confidence: {}  Quality: {}  Attempts: {}",
                confidence,
                if *passes { "pass" } else { "fail" },
                run.attempts.len()
            );
            for violation in grounding_violations {
                println!("  ! {}", violation);
            }
        }
        Outcome::NoEvidence {
            message,
            missing_evidence,
        } => {
            println!("{}", message);
            for hint in missing_evidence {
                println!("  - {}", hint);
            }
        }
        Outcome::Unavailable {
            service,
            stage,
            reason,
        } => {
            eprintln!("The {} service was unavailable during {}: {}", service, stage, reason);
        }
    }
}

fn check_config(path: &std::path::Path) -> Result<ExitCode> {
    let config = load_config(Some(path))?;

    let registry = ProviderRegistry::with_defaults();
    registry
        .validate(&config.provider.provider_type, &config.provider.settings)
        .with_context(|| format!("Provider '{}' is not usable", config.provider.provider_type))?;

    let mut shown = config;
    if let Some(key) = shown.provider.settings.get_mut("api_key") {
        *key = serde_json::Value::String("[REDACTED]".to_string());
    }

    println!("{} is valid\n", path.display());
    print!("{}", serde_yaml::to_string(&shown)?);
    Ok(ExitCode::SUCCESS)
}
