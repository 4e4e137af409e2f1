use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Position of a file within the archive taxonomy, parsed from its
/// directory path: branch / period / subject, plus an optional resource
/// type ("Notes", "Books", "Papers", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyPath {
    pub branch: String,
    pub period: String,
    pub subject: String,
    pub resource_type: Option<String>,
}

/// One file enumerated by the collector. Immutable once created;
/// consumed exactly once by the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source_path: PathBuf,
    pub file_name: String,
    pub taxonomy: TaxonomyPath,
}

/// Document-level OCR output after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    /// None when the cleaned text was empty or below the minimum length.
    pub text: Option<String>,
    /// Mean of positive per-symbol confidences, in [0, 1].
    pub confidence: f32,
    pub char_count: usize,
}

impl OcrResult {
    pub fn empty() -> Self {
        Self {
            text: None,
            confidence: 0.0,
            char_count: 0,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }
}

/// Row persisted for each successfully uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub branch: String,
    pub period: String,
    pub subject: String,
    pub file_name: String,
    pub storage_url: String,
    pub ocr_text: Option<String>,
    pub ocr_done: bool,
}

/// Result of an insert attempt. Duplicate keys are an expected outcome
/// (a concurrent worker or an earlier run won the race), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Reference to an already-ingested note that still needs OCR.
#[derive(Debug, Clone)]
pub struct NoteRef {
    pub id: Uuid,
    pub storage_url: String,
}

/// Why a file ended up in the failure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    UploadFailed,
    DownloadFailed,
    OcrFailed,
    SourceUnreadable,
    StoreFailed,
    WorkerPanicked,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::UploadFailed => "UPLOAD_FAILED",
            FailureReason::DownloadFailed => "DOWNLOAD_FAILED",
            FailureReason::OcrFailed => "OCR_FAILED",
            FailureReason::SourceUnreadable => "SOURCE_UNREADABLE",
            FailureReason::StoreFailed => "STORE_FAILED",
            FailureReason::WorkerPanicked => "WORKER_PANICKED",
        }
    }
}

/// One itemized failure in the batch report. Detail text is truncated
/// at capture time so the summary stays readable.
#[derive(Debug, Clone)]
pub struct FailureDetail {
    pub file_name: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// Aggregate outcome of a batch run, built in completion order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failure_details: Vec<FailureDetail>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, file_name: String, reason: FailureReason, detail: String) {
        const DETAIL_MAX: usize = 200;
        let detail = if detail.len() > DETAIL_MAX {
            let mut cut = DETAIL_MAX;
            while !detail.is_char_boundary(cut) {
                cut -= 1;
            }
            detail[..cut].to_string()
        } else {
            detail
        };
        self.failed += 1;
        self.failure_details.push(FailureDetail {
            file_name,
            reason,
            detail,
        });
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Render a byte count for log lines.
pub fn human_readable_size(num_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = num_bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.2}{}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2}PB", size)
}
