//! `cee` command line.
//!
//! ```text
//! cee check "Contact me at jane@example.com"
//! cee score --tier1 t1.json --tier2 t2.json
//! cee evaluate --input batch.json --provider anthropic --model claude-3-5-sonnet-20241022
//! cee config --file cee.yaml
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cee_core::{
    EvaluationInput, PatternRuleChecker, RuleChecker, Tier1Outcome, Tier2Outcome, Tier3Outcome,
    TrustScoreCalculator,
};
use cee_runtime::{EvaluationOrchestrator, ProviderRegistry, RuntimeConfig};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Contextual Evaluation Engine", long_about = None)]
struct Cli {
    /// YAML configuration file; environment variables override it
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging (otherwise RUST_LOG, default info)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tier 1 rule checks on a text
    Check {
        text: String,

        /// Reference answer for similarity scoring
        #[arg(long)]
        reference: Option<String>,

        #[arg(long)]
        token_limit: Option<usize>,
    },

    /// Compute a trust score from stored tier outcomes
    Score {
        #[arg(long, value_name = "FILE")]
        tier1: PathBuf,

        #[arg(long, value_name = "FILE")]
        tier2: PathBuf,

        #[arg(long, value_name = "FILE")]
        tier3: Option<PathBuf>,
    },

    /// Evaluate one input or a JSON array of inputs through all tiers
    Evaluate {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Judge provider, overriding configuration
        #[arg(long)]
        provider: Option<String>,

        /// Judge model, overriding configuration
        #[arg(long)]
        model: Option<String>,

        /// Runs in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Print the effective configuration as YAML
    Config {
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputFile {
    Batch(Vec<EvaluationInput>),
    Single(EvaluationInput),
}

impl InputFile {
    fn into_inputs(self) -> Vec<EvaluationInput> {
        match self {
            InputFile::Batch(inputs) => inputs,
            InputFile::Single(input) => vec![input],
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid configuration in environment")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_check(
    config: &RuntimeConfig,
    text: &str,
    reference: Option<&str>,
    token_limit: Option<usize>,
) -> Result<()> {
    let checker = PatternRuleChecker::new(token_limit.unwrap_or(config.core.token_limit));
    print_json(&checker.check(text, reference))
}

/// Rebuild a stored tier 1 outcome so `passed` follows the failure flags.
fn rederive_tier1(stored: Tier1Outcome) -> Tier1Outcome {
    Tier1Outcome {
        similarity_score: stored.similarity_score,
        bleu_score: stored.bleu_score,
        details: stored.details,
        ..Tier1Outcome::new(
            stored.pii_detected,
            stored.profanity_detected,
            stored.token_count,
            stored.token_limit_exceeded,
        )
    }
}

/// Rebuild a stored tier 2 outcome so out-of-range scores and a stale mean
/// are rejected.
fn rederive_tier2(stored: Tier2Outcome) -> Result<Tier2Outcome> {
    Tier2Outcome::new(
        stored.factual_accuracy,
        stored.safety_policy,
        stored.alignment_helpfulness,
        stored.tone_style,
        stored.conciseness,
        stored.uncertainty_flag,
        stored.judge_model,
    )
    .context("Invalid tier 2 outcome")
}

fn run_score(
    config: &RuntimeConfig,
    tier1: &Path,
    tier2: &Path,
    tier3: Option<&Path>,
) -> Result<()> {
    let tier1 = rederive_tier1(read_json(tier1)?);
    let tier2 = rederive_tier2(read_json(tier2)?)?;
    let tier3 = tier3.map(read_json::<Tier3Outcome>).transpose()?;

    let calculator = TrustScoreCalculator::new(config.core.weights)?;
    let score = calculator.calculate(&tier1, &tier2, tier3.as_ref());
    let (low, high) = calculator.confidence_interval(&score, tier2.uncertainty_flag);

    print_json(&json!({
        "trust_score": score,
        "confidence_interval": [low, high],
    }))
}

async fn run_evaluate(
    mut config: RuntimeConfig,
    input: &Path,
    provider: Option<String>,
    model: Option<String>,
    concurrency: usize,
) -> Result<()> {
    if let Some(provider) = provider {
        config.judge.provider = provider.to_lowercase();
    }
    if let Some(model) = model {
        config.judge.model = model;
    }
    config.validate()?;

    let inputs = read_json::<InputFile>(input)?.into_inputs();
    if inputs.is_empty() {
        bail!("{} contains no evaluation inputs", input.display());
    }

    let orchestrator =
        EvaluationOrchestrator::from_config(config, &ProviderRegistry::with_defaults())
            .context("Failed to set up the evaluation pipeline")?;

    let total = inputs.len();
    let results = orchestrator.evaluate_batch(inputs, concurrency).await;

    let mut failed = 0;
    let mut report = Vec::with_capacity(results.len());
    for result in results {
        let entry = match result {
            Ok(result) => serde_json::to_value(result)?,
            Err(e) => {
                failed += 1;
                json!({
                    "evaluation_id": e.evaluation_id(),
                    "error": e.to_string(),
                    "recoverable": e.is_recoverable(),
                })
            }
        };
        report.push(entry);
    }
    print_json(&report)?;

    let metrics = orchestrator.dashboard(std::time::Duration::from_secs(24 * 3600));
    tracing::info!(
        total,
        failed,
        average_trust_score = metrics.average_trust_score,
        tier1_pass_rate = metrics.tier1_pass_rate,
        pending_reviews = orchestrator.pending_reviews().len(),
        "Evaluation batch finished"
    );

    if failed > 0 {
        bail!("{failed} of {total} evaluations failed");
    }
    Ok(())
}

fn run_config(config: &RuntimeConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check {
            text,
            reference,
            token_limit,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_check(&config, &text, reference.as_deref(), token_limit)
        }
        Commands::Score { tier1, tier2, tier3 } => {
            let config = load_config(cli.config.as_deref())?;
            run_score(&config, &tier1, &tier2, tier3.as_deref())
        }
        Commands::Evaluate {
            input,
            provider,
            model,
            concurrency,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_evaluate(config, &input, provider, model, concurrency).await
        }
        Commands::Config { file } => {
            let config = load_config(file.as_deref().or(cli.config.as_deref()))?;
            run_config(&config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["cee", "-v", "check", "hello", "--token-limit", "10"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Check {
                text, token_limit, ..
            } => {
                assert_eq!(text, "hello");
                assert_eq!(token_limit, Some(10));
            }
            other => panic!("Expected check, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_evaluate_defaults() {
        let cli = Cli::try_parse_from([
            "cee",
            "evaluate",
            "--input",
            "batch.json",
            "--config",
            "cee.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cee.yaml")));
        match cli.command {
            Commands::Evaluate {
                concurrency,
                provider,
                ..
            } => {
                assert_eq!(concurrency, 4);
                assert!(provider.is_none());
            }
            other => panic!("Expected evaluate, got {other:?}"),
        }
    }

    #[test]
    fn test_score_requires_tier2() {
        assert!(Cli::try_parse_from(["cee", "score", "--tier1", "a.json"]).is_err());
    }

    #[test]
    fn test_input_file_single_and_batch() {
        let single = r#"{"run_id": "r", "prompt": "p", "output": "o", "model_name": "m"}"#;
        let parsed: InputFile = serde_json::from_str(single).unwrap();
        assert_eq!(parsed.into_inputs().len(), 1);

        let batch = format!("[{single}, {single}]");
        let parsed: InputFile = serde_json::from_str(&batch).unwrap();
        let inputs = parsed.into_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].run_id, "r");
    }

    #[test]
    fn test_rederive_tier1_recomputes_passed() {
        let stored = r#"{
            "pii_detected": true,
            "profanity_detected": false,
            "token_count": 12,
            "token_limit_exceeded": false,
            "similarity_score": 0.4,
            "passed": true
        }"#;
        let tier1 = rederive_tier1(serde_json::from_str(stored).unwrap());
        assert!(!tier1.passed);
        assert!(tier1.pii_detected);
        assert_eq!(tier1.token_count, 12);
        assert_eq!(tier1.similarity_score, Some(0.4));

        let clean = rederive_tier1(Tier1Outcome {
            passed: false,
            ..Tier1Outcome::clean(3)
        });
        assert!(clean.passed);
    }

    #[test]
    fn test_rederive_tier2_rejects_out_of_range() {
        let mut tier2 = Tier2Outcome::uniform(4, false, "judge").unwrap();
        tier2.overall_score = 1.0;
        assert_eq!(rederive_tier2(tier2.clone()).unwrap().overall_score, 4.0);

        tier2.safety_policy.score = 9;
        assert!(rederive_tier2(tier2).is_err());
    }
}
