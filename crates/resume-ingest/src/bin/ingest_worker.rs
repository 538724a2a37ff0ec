//! Resume ingestion worker binary
//!
//! Reads dispatcher intakes as JSON lines, runs them through the worker pool
//! and prints one JSON result per job.
//!
//! Run with: cargo run -p resume-ingest --bin ingest-worker -- --jobs jobs.jsonl

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resume_ingest::processing::{
    spawn_watchdog, IngestWorker, JobQueue, PipelineCoordinator, StatusStore,
};
use resume_ingest::providers::{HttpDocumentParser, LocalCandidateStore};
use resume_ingest::storage::IngestDb;
use resume_ingest::{IngestConfig, JobIntake, ProcessingResult};

/// Resume ingestion worker
#[derive(Parser, Debug)]
#[command(name = "ingest-worker")]
#[command(version, about = "Runs resume ingestion jobs from JSON lines", long_about = None)]
struct Cli {
    /// TOML config file (falls back to RESUME_INGEST_CONFIG)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short = 'd', long = "database")]
    database: Option<PathBuf>,

    /// Number of workers
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// JSON-lines file of job intakes, or "-" for stdin
    #[arg(short = 'j', long = "jobs", default_value = "-")]
    jobs: String,

    /// Create missing candidates before submitting their jobs
    #[arg(long = "register-candidates")]
    register_candidates: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobOutput {
    job_id: String,
    #[serde(flatten)]
    result: ProcessingResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = IngestConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }
    if let Some(workers) = cli.workers {
        config.processing.workers = Some(workers);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Parser: {}", config.parser.base_url);
    tracing::info!("  - Workers: {}", config.processing.worker_count());
    tracing::info!("  - Max attempts: {}", config.processing.max_attempts);

    let config = Arc::new(config);
    let db = Arc::new(IngestDb::new(&config.storage.database_path)?);
    let statuses = Arc::new(StatusStore::with_database(db.clone())?);
    let parser = Arc::new(HttpDocumentParser::new(&config.parser)?);
    let store = Arc::new(LocalCandidateStore::new(db.clone()));

    let coordinator = Arc::new(PipelineCoordinator::new(
        config.clone(),
        statuses.clone(),
        parser,
        store,
    ));

    // Watchdog finalizes jobs left behind by a previous run too
    let (stop, shutdown) = watch::channel(false);
    let watchdog = spawn_watchdog(coordinator.clone(), shutdown);

    let (queue, receiver) = JobQueue::new(&config.processing);
    let pool = IngestWorker::new(coordinator.clone(), queue.clone()).spawn(receiver);

    let submitted = if cli.jobs == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        submit_lines(reader, &queue, &db, cli.register_candidates).await?
    } else {
        let file = tokio::fs::File::open(&cli.jobs)
            .await
            .with_context(|| format!("Failed to open jobs file '{}'", cli.jobs))?;
        submit_lines(BufReader::new(file), &queue, &db, cli.register_candidates).await?
    };

    tracing::info!("Submitted {} jobs, waiting for results", submitted.len());
    queue.wait_idle().await;

    for job_id in submitted {
        if let Some(result) = queue.take_result(&job_id) {
            let line = serde_json::to_string(&JobOutput { job_id, result })?;
            println!("{}", line);
        }
    }

    pool.shutdown().await;
    let _ = stop.send(true);
    watchdog.await?;

    let stats = queue.stats();
    tracing::info!(
        "Done: {} succeeded, {} failed, {} retries",
        stats.succeeded,
        stats.failed,
        stats.retried
    );

    Ok(())
}

async fn submit_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    queue: &JobQueue,
    db: &IngestDb,
    register_candidates: bool,
) -> anyhow::Result<Vec<String>> {
    let mut lines = reader.lines();
    let mut submitted = Vec::new();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let intake: JobIntake = match serde_json::from_str(line) {
            Ok(intake) => intake,
            Err(e) => {
                tracing::warn!("Skipping line {}: invalid job intake: {}", line_number, e);
                continue;
            }
        };

        if register_candidates {
            if let Some(candidate_id) = intake.candidate_id.as_deref() {
                if !candidate_id.trim().is_empty() && db.register_candidate(candidate_id.trim())? {
                    tracing::info!("Registered candidate {}", candidate_id.trim());
                }
            }
        }

        submitted.push(queue.submit(intake).await?);
    }

    Ok(submitted)
}
