use anyhow::{anyhow, Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::db::MetadataStore;
use crate::models::{human_readable_size, BatchReport, FailureReason, NoteRef};
use crate::ocr::OcrDispatcher;
use crate::retry::{is_transient, RetryPolicy};
use crate::storage::ocr_mime_type;

/// Typed failure from one backfill attempt, so the report classifies by
/// pipeline stage instead of parsing error text.
struct BackfillFailure {
    reason: FailureReason,
    source: Error,
}

impl BackfillFailure {
    fn new(reason: FailureReason, source: Error) -> Self {
        Self { reason, source }
    }
}

/// Finds notes whose OCR never completed, downloads each from its storage
/// URL, runs the dispatcher and writes the text back. With `force` every
/// note is reprocessed, replacing existing OCR.
pub struct BackfillRunner {
    records: Arc<dyn MetadataStore>,
    dispatcher: Arc<OcrDispatcher>,
    http: reqwest::Client,
    retry: RetryPolicy,
    dry_run: bool,
}

impl BackfillRunner {
    pub fn new(
        records: Arc<dyn MetadataStore>,
        dispatcher: Arc<OcrDispatcher>,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            records,
            dispatcher,
            http,
            retry: RetryPolicy::default(),
            dry_run,
        })
    }

    pub async fn run(&self, concurrency: usize, force: bool) -> Result<BatchReport> {
        if force {
            warn!("force-OCR enabled: existing OCR text will be replaced");
        }
        let notes = self.records.notes_missing_ocr(force).await?;
        let total = notes.len();
        let mut report = BatchReport::new(total);
        if total == 0 {
            info!("no notes require OCR backfill");
            report.finished_at = Some(Utc::now());
            return Ok(report);
        }
        info!("found {} notes to backfill (force={})", total, force);

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks: JoinSet<(String, Result<bool, BackfillFailure>)> = JoinSet::new();

        for note in notes {
            let semaphore = semaphore.clone();
            let runner = self.clone_for_task();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("pool semaphore closed");
                let label = note
                    .storage_url
                    .rsplit('/')
                    .next()
                    .unwrap_or(&note.storage_url)
                    .to_string();
                let outcome = runner.backfill_note(&note).await;
                (label, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(true))) => report.record_success(),
                Ok((_, Ok(false))) => report.record_skip(),
                Ok((label, Err(failure))) => {
                    error!(
                        "FAILED: {} - {}: {:#}",
                        label,
                        failure.reason.code(),
                        failure.source
                    );
                    report.record_failure(label, failure.reason, format!("{:#}", failure.source));
                }
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
        Ok(report)
    }

    fn clone_for_task(&self) -> BackfillWorker {
        BackfillWorker {
            records: self.records.clone(),
            dispatcher: self.dispatcher.clone(),
            http: self.http.clone(),
            retry: self.retry.clone(),
            dry_run: self.dry_run,
        }
    }
}

struct BackfillWorker {
    records: Arc<dyn MetadataStore>,
    dispatcher: Arc<OcrDispatcher>,
    http: reqwest::Client,
    retry: RetryPolicy,
    dry_run: bool,
}

impl BackfillWorker {
    /// Ok(true) when OCR text was written, Ok(false) when the note was
    /// skipped because no usable text came back.
    async fn backfill_note(&self, note: &NoteRef) -> Result<bool, BackfillFailure> {
        let url = &note.storage_url;
        let file_name = url.rsplit('/').next().unwrap_or(url);

        let bytes = self
            .retry
            .run("storage download", is_transient, || async {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| anyhow!("download failed for {}: {}", url, e))?;
                let response = response
                    .error_for_status()
                    .map_err(|e| anyhow!("download failed for {}: {}", url, e))?;
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| anyhow!("download failed for {}: {}", url, e))?;
                Ok(body.to_vec())
            })
            .await
            .map_err(|e| BackfillFailure::new(FailureReason::DownloadFailed, e))?;

        let mime = ocr_mime_type(file_name);
        info!(
            "backfilling OCR for {} ({}, {})",
            file_name,
            mime,
            human_readable_size(bytes.len() as u64)
        );

        let result = self
            .dispatcher
            .extract(&bytes, &mime, file_name)
            .await
            .map_err(|e| {
                BackfillFailure::new(
                    FailureReason::OcrFailed,
                    anyhow!("OCR failed for {}: {}", file_name, e),
                )
            })?;

        match result.and_then(|r| r.text) {
            Some(text) => {
                if self.dry_run {
                    info!("[dry-run] would update OCR for note {}", note.id);
                } else {
                    self.records
                        .update_note_ocr(note.id, &text)
                        .await
                        .map_err(|e| BackfillFailure::new(FailureReason::StoreFailed, e))?;
                }
                info!("updated OCR for {} ({} chars)", file_name, text.chars().count());
                Ok(true)
            }
            None => {
                warn!("no usable text extracted from {}", file_name);
                Ok(false)
            }
        }
    }
}
