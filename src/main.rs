//! Invoice Guard - Main Entry Point
//!
//! Reads extracted invoices as JSON lines, scores each against the store and
//! writes one JSON assessment per line to stdout.

use anyhow::{bail, Context, Result};
use clap::Parser;
use invoice_guard::{
    config::{AppConfig, LoggingConfig, StoreBackend},
    metrics::{MetricsReporter, PipelineMetrics},
    store, IncomingInvoice, InvoiceAssessment, RiskEngine, StoreError,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

type AssessTask = JoinHandle<std::result::Result<InvoiceAssessment, StoreError>>;

#[derive(Parser, Debug)]
#[command(name = "invoice-guard", version, about = "Score extracted invoices for duplicate and anomaly risk")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// JSON lines input, `-` for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// SQLite database path, overrides the configured store
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) = load_config(&args.config)?;
    init_logging(&config.logging)?;

    info!("Starting Invoice Guard");
    match config_source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => warn!(
            path = %args.config.display(),
            "Configuration file not found, using defaults"
        ),
    }

    if let Some(db) = args.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = db;
    }

    let store = store::open(&config.store).context("Failed to open invoice store")?;
    let metrics = Arc::new(PipelineMetrics::new());
    let engine = Arc::new(RiskEngine::new(&config, store, metrics.clone()));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    let reporter_handle = tokio::spawn(reporter.start());

    let workers = config.pipeline.workers.max(1);
    info!(workers, input = %args.input, "Starting assessment loop");

    let outcome = if args.input == "-" {
        run(BufReader::new(tokio::io::stdin()), engine, workers).await
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("Failed to open input {}", args.input))?;
        run(BufReader::new(file), engine, workers).await
    };

    reporter_handle.abort();
    info!("Invoice Guard shutting down...");
    metrics.print_summary();

    let summary = outcome?;
    info!(
        assessed = summary.assessed,
        skipped = summary.skipped,
        "Assessment complete"
    );

    if summary.store_failed {
        bail!("invoice store failure, stopped after {} invoices", summary.assessed);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RunSummary {
    assessed: u64,
    skipped: u64,
    store_failed: bool,
}

/// Assess every line of `reader`, writing assessments to stdout in input order.
///
/// At most `workers` invoices are in flight. After a store failure no new lines
/// are started; work already in flight is drained.
async fn run<R>(reader: R, engine: Arc<RiskEngine>, workers: usize) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
{
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut stdout = tokio::io::stdout();
    let mut pending: VecDeque<AssessTask> = VecDeque::new();
    let mut summary = RunSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let incoming: IncomingInvoice = match serde_json::from_str(&line) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable invoice");
                summary.skipped += 1;
                continue;
            }
        };

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker pool closed")?;
        let engine = engine.clone();
        pending.push_back(tokio::task::spawn_blocking(move || {
            let result = engine.assess(incoming);
            drop(permit);
            result
        }));

        while pending.front().is_some_and(|task| task.is_finished()) {
            if let Some(task) = pending.pop_front() {
                emit(task, &mut stdout, &mut summary).await?;
            }
        }
        if summary.store_failed {
            break;
        }
    }

    while let Some(task) = pending.pop_front() {
        emit(task, &mut stdout, &mut summary).await?;
    }

    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(summary)
}

async fn emit(
    task: AssessTask,
    stdout: &mut tokio::io::Stdout,
    summary: &mut RunSummary,
) -> Result<()> {
    match task.await.context("Assessment task panicked")? {
        Ok(assessment) => {
            let mut line = serde_json::to_vec(&assessment)?;
            line.push(b'\n');
            stdout
                .write_all(&line)
                .await
                .context("Failed to write assessment")?;
            summary.assessed += 1;
        }
        Err(e) => {
            error!(error = %e, "Invoice store failure");
            summary.store_failed = true;
        }
    }
    Ok(())
}

/// Load configuration, falling back to defaults when the file does not exist
fn load_config(path: &Path) -> Result<(AppConfig, Option<PathBuf>)> {
    if path.exists() {
        let config = AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        Ok((config, Some(path.to_path_buf())))
    } else {
        Ok((AppConfig::default(), None))
    }
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
