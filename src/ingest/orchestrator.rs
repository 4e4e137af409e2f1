use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RunOptions;
use crate::db::MetadataStore;
use crate::ingest::IngestMode;
use crate::models::{
    human_readable_size, FailureReason, IngestionRecord, InsertOutcome, OcrResult, WorkItem,
};
use crate::ocr::OcrDispatcher;
use crate::retry::{is_transient, RetryPolicy};
use crate::storage::{content_headers, ocr_mime_type, storage_key, storage_url, subject_id,
    ObjectStore};

/// Terminal state of one WorkItem's pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Succeeded,
    /// The derived URL was already in the record store.
    SkippedExists,
    /// Lost the insert race to a concurrent writer.
    SkippedDuplicate,
    Failed {
        reason: FailureReason,
        detail: String,
    },
}

impl FileOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, FileOutcome::SkippedExists | FileOutcome::SkippedDuplicate)
    }

    fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        FileOutcome::Failed {
            reason,
            detail: detail.into(),
        }
    }
}

/// Per-file pipeline: existence check, upload, optional OCR, insert.
///
/// The orchestrator is the unit of idempotency and error containment: it
/// never lets one file's failure escape, and it never compensates a partial
/// failure with deletes; re-running the batch behind the existence check
/// is the recovery mechanism.
pub struct Orchestrator {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn MetadataStore>,
    dispatcher: Arc<OcrDispatcher>,
    bucket: String,
    options: RunOptions,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn MetadataStore>,
        dispatcher: Arc<OcrDispatcher>,
        bucket: &str,
        options: RunOptions,
    ) -> Self {
        Self {
            objects,
            records,
            dispatcher,
            bucket: bucket.to_string(),
            options,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn process(&self, item: &WorkItem, mode: IngestMode) -> FileOutcome {
        let key = storage_key(&item.taxonomy, &item.file_name);
        let url = storage_url(&self.bucket, &item.taxonomy, &item.file_name);

        // EXISTS_CHECK. A lookup failure is not a reason to drop the file:
        // a best-effort retried read, then worst case the later
        // duplicate-key path absorbs the re-ingest.
        let exists = self
            .retry
            .run_swallowing("existence check", is_transient, || async {
                if mode.is_books() {
                    self.records.book_exists(&url).await
                } else {
                    self.records.note_exists(&url).await
                }
            })
            .await;
        match exists {
            Ok(Some(true)) => {
                info!("already ingested, skipping: {}", item.file_name);
                return FileOutcome::SkippedExists;
            }
            Ok(Some(false)) => {}
            Ok(None) => warn!("existence check for {} kept failing; treating as new", url),
            Err(e) => warn!("existence check failed for {}: {:#}", url, e),
        }

        let file_size = match tokio::fs::metadata(&item.source_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return FileOutcome::failed(
                    FailureReason::SourceUnreadable,
                    format!("cannot stat {}: {}", item.source_path.display(), e),
                )
            }
        };

        // UPLOAD
        info!(
            "uploading: {} ({})",
            item.file_name,
            human_readable_size(file_size)
        );
        if self.options.dry_run {
            info!("[dry-run] would upload to s3://{}/{}", self.bucket, key);
            return FileOutcome::Succeeded;
        }
        let headers = content_headers(&item.file_name);
        if let Err(e) = self.objects.upload(&item.source_path, &key, &headers).await {
            return FileOutcome::failed(FailureReason::UploadFailed, format!("{:#}", e));
        }

        // Subject row is best-effort: a missing subject does not block the
        // record, and the deterministic id keeps racing workers convergent.
        let subject = subject_id(&item.taxonomy);
        if let Err(e) = self
            .records
            .ensure_subject(
                subject,
                &item.taxonomy.branch,
                &item.taxonomy.period,
                &item.taxonomy.subject,
            )
            .await
        {
            warn!("subject upsert failed for {}: {:#}", item.taxonomy.subject, e);
        }

        // OCR (only in OCR-enabled mode). A service error here leaves the
        // file uploaded but unrecorded; the next run retries it through the
        // existence check.
        let mut ocr_text: Option<String> = None;
        let mut ocr_done = false;
        if mode.wants_ocr() {
            let bytes = match tokio::fs::read(&item.source_path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return FileOutcome::failed(
                        FailureReason::SourceUnreadable,
                        format!("cannot read {}: {}", item.source_path.display(), e),
                    )
                }
            };
            let mime = ocr_mime_type(&item.file_name);
            match self.dispatcher.extract(&bytes, &mime, &item.file_name).await {
                Ok(Some(OcrResult { text, .. })) => {
                    ocr_done = text.is_some();
                    ocr_text = text;
                }
                Ok(None) => {
                    info!("no usable text extracted from {}", item.file_name);
                }
                Err(e) => {
                    return FileOutcome::failed(
                        FailureReason::OcrFailed,
                        format!("{} ({})", e, e.error_code()),
                    )
                }
            }
        }

        // INSERT
        let record = IngestionRecord {
            id: Uuid::new_v4(),
            subject_id: subject,
            branch: item.taxonomy.branch.clone(),
            period: item.taxonomy.period.clone(),
            subject: item.taxonomy.subject.clone(),
            file_name: item.file_name.clone(),
            storage_url: url,
            ocr_text,
            ocr_done,
        };
        let inserted = if mode.is_books() {
            self.records.insert_book(&record).await
        } else {
            self.records.insert_note(&record).await
        };
        match inserted {
            Ok(InsertOutcome::Inserted) => {
                info!("processed: {}", item.file_name);
                FileOutcome::Succeeded
            }
            Ok(InsertOutcome::Duplicate) => FileOutcome::SkippedDuplicate,
            Err(e) => FileOutcome::failed(FailureReason::StoreFailed, format!("{:#}", e)),
        }
    }
}
