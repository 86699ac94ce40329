//! crucible — CLI for the detonation and defense-evaluation pipeline.
//!
//! Exit codes: 0 clean run, 1 when any violation verdict was observed,
//! 2 on a harness fault (docker missing, bad config, unreadable input).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crucible_core::dataset::{self, DatasetWriter};
use crucible_core::defense::DefenseEvaluator;
use crucible_core::pipeline::{DefenseRecord, IterationRecord, Orchestrator, RunStats};
use crucible_core::providers;
use crucible_core::sample::CodeSample;
use crucible_core::sandbox::DockerSandbox;
use crucible_core::{CrucibleConfig, Verdict};

const EXIT_OK: u8 = 0;
const EXIT_VIOLATION: u8 = 1;
const EXIT_HARNESS_FAULT: u8 = 2;

#[derive(Parser)]
#[command(
    name = "crucible",
    version,
    about = "Contained detonation range and paraphrasing-defense evaluator for LLM-generated code"
)]
struct Cli {
    /// Config file; the platform config dir is consulted when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate candidate samples and detonate them in the sandbox.
    Breed {
        /// Number of iterations; overrides the configured count.
        #[arg(long)]
        iterations: Option<u32>,
        /// Max iterations in flight at once.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Sanitize recorded attacks and evaluate the paraphrasing defense.
    Defend {
        /// Attack dataset to read; defaults to the configured path.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Skip detonating the sanitized side.
        #[arg(long)]
        no_detonate: bool,
    },
    /// Detonate one sample file (or inline code) in the sandbox.
    Exec {
        /// Sample file to run.
        file: Option<PathBuf>,
        /// Inline code instead of a file.
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,
    },
    /// Recompute aggregate statistics from a recorded dataset.
    Stats {
        /// Dataset to fold; defaults to the configured attack file.
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match CrucibleConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_HARNESS_FAULT);
        }
    };

    let result = match cli.command {
        Command::Breed {
            iterations,
            concurrency,
        } => cmd_breed(config, iterations, concurrency).await,
        Command::Defend { input, no_detonate } => cmd_defend(config, input, no_detonate).await,
        Command::Exec { file, code } => cmd_exec(config, file, code).await,
        Command::Stats { file } => cmd_stats(config, file).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_HARNESS_FAULT)
        }
    }
}

/// Assembles the pipeline, failing fast on harness faults.
async fn build_orchestrator(config: &CrucibleConfig) -> Result<Orchestrator> {
    let sandbox = Arc::new(DockerSandbox::new(config.sandbox.clone()));
    sandbox.ensure_ready().await?;
    let writer = providers::create_writer(&config.collaborator)?;
    info!(
        "collaborator: {} ({})",
        writer.provider_name(),
        writer.model(),
    );
    let evaluator = Arc::new(DefenseEvaluator::new(config.scanner.build_table()));
    Ok(Orchestrator::new(sandbox, writer, evaluator)
        .with_max_retries(config.collaborator.max_retries))
}

/// Ctrl-C cancels in-flight runs instead of abandoning containers.
fn watch_for_abort(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("abort requested, cancelling in-flight runs");
            token.cancel();
        }
    });
}

async fn cmd_breed(
    config: CrucibleConfig,
    iterations: Option<u32>,
    concurrency: Option<usize>,
) -> Result<u8> {
    let iterations = iterations.unwrap_or(config.pipeline.iterations);
    let concurrency = concurrency.unwrap_or(config.pipeline.concurrency);

    let orchestrator = build_orchestrator(&config)
        .await?
        .with_dataset(DatasetWriter::new(&config.dataset.attack_file));
    watch_for_abort(orchestrator.cancel_token());

    info!("breeding {iterations} iterations, {concurrency} in flight");
    let stats = orchestrator.run(iterations, concurrency).await;
    print_stats(&stats);
    println!("records appended to {}", config.dataset.attack_file.display());
    Ok(exit_code_for(&stats))
}

async fn cmd_defend(
    config: CrucibleConfig,
    input: Option<PathBuf>,
    no_detonate: bool,
) -> Result<u8> {
    let input = input.unwrap_or_else(|| config.dataset.attack_file.clone());
    let records: Vec<IterationRecord> = dataset::load_jsonl(&input).await?;
    let mut originals: Vec<CodeSample> = records.into_iter().filter_map(|r| r.original).collect();
    originals.sort_by_key(|sample| sample.id);
    if originals.is_empty() {
        bail!("no usable samples in {}", input.display());
    }
    info!("evaluating defense over {} samples", originals.len());

    let orchestrator = build_orchestrator(&config).await?;
    watch_for_abort(orchestrator.cancel_token());
    let results = DatasetWriter::new(&config.dataset.results_file);
    let detonate = config.pipeline.detonate_sanitized && !no_detonate;

    let mut evaluated = Vec::with_capacity(originals.len());
    for original in &originals {
        let record = orchestrator.run_defense(original, detonate).await;
        match (&record.defense, &record.failure) {
            (Some(defense), _) => println!(
                "sample {}: success={} stripped {} -> {} indicators",
                record.id,
                defense.success,
                defense.original_indicators.len(),
                defense.sanitized_indicators.len(),
            ),
            (None, Some(failure)) => println!(
                "sample {}: incomplete at {} ({})",
                record.id, failure.stage, failure.reason,
            ),
            (None, None) => {}
        }
        if let Err(e) = results.append(&record).await {
            warn!("could not persist defense record {}: {e:#}", record.id);
        }
        evaluated.push(record);
    }

    print_defense_summary(&evaluated);
    println!("results appended to {}", config.dataset.results_file.display());

    let violation_seen = evaluated
        .iter()
        .any(|r| r.sanitized_verdict.is_some_and(|v| v.is_violation()));
    Ok(if violation_seen { EXIT_VIOLATION } else { EXIT_OK })
}

async fn cmd_exec(
    config: CrucibleConfig,
    file: Option<PathBuf>,
    code: Option<String>,
) -> Result<u8> {
    let text = match (file, code) {
        (Some(path), None) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read sample {}", path.display()))?,
        (None, Some(code)) => code,
        _ => bail!("provide a sample file or --code"),
    };

    let sandbox = DockerSandbox::new(config.sandbox.clone());
    sandbox.ensure_ready().await?;
    let token = CancellationToken::new();
    watch_for_abort(token.clone());

    let sample = CodeSample::original(1, text);
    let outcome = sandbox.run(&sample, &token).await?;
    let verdict = outcome.verdict();

    if !outcome.stdout.is_empty() {
        println!("--- stdout ---\n{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        println!("--- stderr ---\n{}", outcome.stderr);
    }
    println!(
        "exit={:?} kill_reason={:?} duration={}ms",
        outcome.exit_code, outcome.kill_reason, outcome.duration_ms,
    );
    println!("verdict: {verdict}");

    Ok(if verdict == Verdict::NormalExit {
        EXIT_OK
    } else {
        EXIT_VIOLATION
    })
}

async fn cmd_stats(config: CrucibleConfig, file: Option<PathBuf>) -> Result<u8> {
    let path = file.unwrap_or_else(|| config.dataset.attack_file.clone());
    let mut records: Vec<IterationRecord> = dataset::load_jsonl(&path).await?;
    records.sort_by_key(|record| record.id);
    let stats = RunStats::from_records(&records);
    print_stats(&stats);
    Ok(exit_code_for(&stats))
}

fn print_stats(stats: &RunStats) {
    println!("==================== run summary ====================");
    println!(
        "iterations: {} ({} completed)",
        stats.iterations, stats.completed,
    );
    if !stats.verdicts.is_empty() {
        let verdicts = stats
            .verdicts
            .iter()
            .map(|(verdict, count)| format!("{verdict}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("verdicts: {verdicts}");
    }
    match stats.defense_success_rate() {
        Some(rate) => println!(
            "defense: {}/{} successful ({:.1}%)",
            stats.defense_successes,
            stats.defense_evaluated,
            rate * 100.0,
        ),
        None => println!("defense: no evaluated pairs"),
    }
    if let Some(ratio) = stats.mean_reduction_ratio {
        println!("mean reduction ratio: {ratio:.3}");
    }
    println!("=====================================================");
}

fn print_defense_summary(records: &[DefenseRecord]) {
    let evaluated = records.iter().filter(|r| r.defense.is_some()).count();
    let successes = records
        .iter()
        .filter(|r| r.defense.as_ref().is_some_and(|d| d.success))
        .count();
    let incomplete = records.len() - evaluated;
    println!("================= defense summary ===================");
    println!("samples: {} ({} incomplete)", records.len(), incomplete);
    if evaluated > 0 {
        println!(
            "defense successful: {}/{} ({:.1}%)",
            successes,
            evaluated,
            successes as f64 / evaluated as f64 * 100.0,
        );
    }
    println!("=====================================================");
}

/// Any violation verdict in the run surfaces as exit 1.
fn exit_code_for(stats: &RunStats) -> u8 {
    let violation = stats
        .verdicts
        .iter()
        .any(|(verdict, count)| verdict.is_violation() && *count > 0);
    if violation { EXIT_VIOLATION } else { EXIT_OK }
}
