use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::ingest::orchestrator::{FileOutcome, Orchestrator};
use crate::ingest::IngestMode;
use crate::models::{BatchReport, FailureReason, WorkItem};

/// Fans WorkItems out over a bounded worker pool and folds the outcomes
/// into a [`BatchReport`].
///
/// Each item is fully independent; the only shared state is the report,
/// which is updated on this task as workers complete. Failure details are
/// therefore in completion order, not submission order. A panicking worker
/// is counted as a failure and never aborts the batch.
pub struct BatchCoordinator {
    orchestrator: Arc<Orchestrator>,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn run_batch(
        &self,
        items: Vec<WorkItem>,
        mode: IngestMode,
        concurrency: usize,
    ) -> BatchReport {
        let total = items.len();
        let mut report = BatchReport::new(total);
        if total == 0 {
            report.finished_at = Some(Utc::now());
            return report;
        }

        info!(
            "starting batch: {} files, mode: {}, {} workers",
            total,
            mode.label(),
            concurrency.max(1)
        );

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks: JoinSet<(String, FileOutcome)> = JoinSet::new();

        for item in items {
            let semaphore = semaphore.clone();
            let orchestrator = self.orchestrator.clone();
            tasks.spawn(async move {
                // Closing the semaphore is not part of this design; acquire
                // can only fail then, so treat it as infallible.
                let _permit = semaphore.acquire_owned().await.expect("pool semaphore closed");
                let outcome = orchestrator.process(&item, mode).await;
                (item.file_name, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, FileOutcome::Succeeded)) => report.record_success(),
                Ok((_, outcome)) if outcome.is_skip() => report.record_skip(),
                Ok((file_name, FileOutcome::Failed { reason, detail })) => {
                    error!("FAILED: {} - {}: {}", file_name, reason.code(), detail);
                    report.record_failure(file_name, reason, detail);
                }
                Ok(_) => unreachable!("skip outcomes are matched above"),
                Err(join_err) => {
                    error!("worker crashed: {}", join_err);
                    report.record_failure(
                        "unknown".to_string(),
                        FailureReason::WorkerPanicked,
                        join_err.to_string(),
                    );
                }
            }

            let done = report.completed();
            info!(
                "progress: {}/{} ({:.1}%) | success: {} | skipped: {} | failed: {}",
                done,
                total,
                done as f64 / total as f64 * 100.0,
                report.succeeded,
                report.skipped,
                report.failed
            );
        }

        report.finished_at = Some(Utc::now());
        report
    }
}

/// Final human-readable summary, printed regardless of how many files
/// failed. The process still exits zero after a completed batch.
pub fn log_summary(report: &BatchReport) {
    let elapsed_minutes = match (report.started_at, report.finished_at) {
        (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 60.0,
        _ => 0.0,
    };
    info!(
        "batch complete: total={} | success={} | skipped={} | failed={} | time={:.2} min",
        report.total, report.succeeded, report.skipped, report.failed, elapsed_minutes
    );

    if !report.failure_details.is_empty() {
        error!("failed files ({} total):", report.failed);
        for (idx, failure) in report.failure_details.iter().enumerate() {
            error!(
                "  {}. {} [{}] {}",
                idx + 1,
                failure.file_name,
                failure.reason.code(),
                failure.detail
            );
        }
    }
}
