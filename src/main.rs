use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docvault::collector::collect_work_items;
use docvault::config::{Config, RunOptions, DEFAULT_CHUNK_PAGES, DEFAULT_WORKERS};
use docvault::db::Database;
use docvault::ingest::{BackfillRunner, BatchCoordinator, IngestMode, Orchestrator};
use docvault::ingest::batch::log_summary;
use docvault::ocr::vision::VisionClient;
use docvault::ocr::OcrDispatcher;
use docvault::storage::S3Store;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Upload notes and extract text in the same pass.
    IngestWithOcr,
    /// Upload notes only; OCR can be backfilled later.
    IngestWithoutOcr,
    /// Upload the Books subtree (never OCRed).
    IngestBooks,
    /// OCR already-uploaded notes that have no text yet.
    BackfillOcr,
}

#[derive(Parser, Debug)]
#[command(name = "docvault", about = "Batch migration of scanned course documents", version)]
struct Cli {
    #[arg(long, value_enum)]
    mode: Mode,

    /// Root of the local document tree (defaults to DOCVAULT_BASE_PATH).
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Initial PDF chunk size in pages for oversized documents.
    #[arg(long, default_value_t = DEFAULT_CHUNK_PAGES)]
    chunk_pages: usize,

    /// Parallel workers. Kept small: the OCR and storage APIs are the
    /// bottleneck, not local CPU.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Log what would happen without uploading or writing records.
    #[arg(long)]
    dry_run: bool,

    /// Re-OCR every note, replacing existing text (backfill mode only).
    #[arg(long)]
    force_ocr: bool,

    /// Log filter, e.g. "debug" or "docvault=debug" (RUST_LOG also works).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(base_path) = &cli.base_path {
        config.base_path = base_path.clone();
    }

    let needs_base_path = !matches!(cli.mode, Mode::BackfillOcr);
    if let Err(e) = config.validate(needs_base_path) {
        error!("{:#}", e);
        return ExitCode::from(2);
    }
    info!("startup validation passed");

    let options = RunOptions::new(&config.base_path, cli.chunk_pages, cli.workers)
        .with_dry_run(cli.dry_run)
        .with_force_ocr(cli.force_ocr);
    if options.dry_run {
        warn!("dry-run mode: no uploads or record writes will happen");
    }

    match run(&config, &options, cli.mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config, options: &RunOptions, mode: Mode) -> anyhow::Result<()> {
    let database = Arc::new(Database::connect(&config.database_url).await?);
    let engine = Arc::new(VisionClient::new(
        &config.vision_endpoint,
        &config.vision_api_key,
        config.timeout(),
    )?);
    let dispatcher = Arc::new(OcrDispatcher::new(
        engine,
        options.inline_size_limit,
        options.start_chunk_pages,
    ));

    match mode {
        Mode::BackfillOcr => {
            let runner = BackfillRunner::new(
                database,
                dispatcher,
                Duration::from_secs(config.http_timeout_seconds),
                options.dry_run,
            )?;
            let report = runner.run(options.workers, options.force_ocr).await?;
            log_summary(&report);
        }
        Mode::IngestWithOcr | Mode::IngestWithoutOcr | Mode::IngestBooks => {
            let ingest_mode = match mode {
                Mode::IngestWithOcr => IngestMode::NotesWithOcr,
                Mode::IngestWithoutOcr => IngestMode::NotesWithoutOcr,
                _ => IngestMode::Books,
            };
            let items =
                collect_work_items(&options.base_path, !ingest_mode.is_books())?;
            if items.is_empty() {
                warn!("no files found to process");
                return Ok(());
            }

            let objects = Arc::new(S3Store::new(config)?);
            let orchestrator = Arc::new(Orchestrator::new(
                objects,
                database,
                dispatcher,
                &config.s3_bucket,
                options.clone(),
            ));
            let report = BatchCoordinator::new(orchestrator)
                .run_batch(items, ingest_mode, options.workers)
                .await;
            log_summary(&report);
        }
    }

    Ok(())
}
