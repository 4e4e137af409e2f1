pub mod chunker;
pub mod confidence;
pub mod error;
pub mod normalize;
pub mod vision;

use std::sync::Arc;
use tracing::{info, warn};

use crate::models::OcrResult;
use crate::retry::RetryPolicy;
use chunker::{ChunkPlanner, ChunkRange, LopdfSlicer, PdfSlicer};
use confidence::{average_confidence, warn_if_low};
use error::OcrError;
use normalize::normalize;
use vision::OcrEngine;

/// Routes a byte payload to the right extraction strategy and turns raw
/// service output into a normalized, confidence-scored [`OcrResult`].
///
/// Engine calls retry transient service errors before giving up. What a
/// failure then means depends on the path: single-shot errors propagate,
/// while inside a chunked PDF a failing range is logged and dropped so
/// partial OCR beats aborting the whole document. `Ok(None)` means
/// extraction ran but produced no usable text.
pub struct OcrDispatcher {
    engine: Arc<dyn OcrEngine>,
    retry: RetryPolicy,
    inline_size_limit: u64,
    start_chunk_pages: usize,
}

impl OcrDispatcher {
    pub fn new(engine: Arc<dyn OcrEngine>, inline_size_limit: u64, start_chunk_pages: usize) -> Self {
        Self {
            engine,
            retry: RetryPolicy::default(),
            inline_size_limit,
            start_chunk_pages: start_chunk_pages.max(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Engine call with transient-error retry; permanent errors propagate
    /// on the first attempt.
    async fn annotate_with_retry(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<vision::Annotation, OcrError> {
        self.retry
            .run("ocr annotate", OcrError::is_transient, || async {
                self.engine.annotate(bytes, mime_type).await
            })
            .await
    }

    pub async fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        label: &str,
    ) -> Result<Option<OcrResult>, OcrError> {
        if mime_type.starts_with("image/") {
            return self.extract_single_shot(bytes, mime_type, label).await;
        }
        if mime_type == "application/pdf" {
            if bytes.len() as u64 > self.inline_size_limit {
                info!(
                    "{} exceeds the inline limit, using adaptive chunk OCR",
                    label
                );
                return self.extract_chunked_pdf(bytes, label).await;
            }
            return self.extract_single_shot(bytes, mime_type, label).await;
        }

        warn!("unsupported MIME type for OCR: {} ({})", mime_type, label);
        Ok(None)
    }

    async fn extract_single_shot(
        &self,
        bytes: &[u8],
        mime_type: &str,
        label: &str,
    ) -> Result<Option<OcrResult>, OcrError> {
        let annotation = self.annotate_with_retry(bytes, mime_type).await?;
        let confidence = average_confidence(&annotation.symbol_confidences);
        warn_if_low(confidence, label);

        match normalize(Some(&annotation.text)) {
            Some(text) => {
                let char_count = text.chars().count();
                info!(
                    "OCR completed for {} (confidence: {:.1}%, {} chars)",
                    label,
                    confidence * 100.0,
                    char_count
                );
                Ok(Some(OcrResult {
                    text: Some(text),
                    confidence,
                    char_count,
                }))
            }
            None => Ok(None),
        }
    }

    async fn extract_chunked_pdf(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<Option<OcrResult>, OcrError> {
        let slicer = LopdfSlicer::from_bytes(bytes)?;
        if slicer.page_count() == 0 {
            return Ok(None);
        }

        // The planner is consumed range by range so only one serialized
        // chunk is held in memory at a time.
        let mut planner = ChunkPlanner::new(
            &slicer,
            self.inline_size_limit,
            self.start_chunk_pages,
            label,
        );

        let mut parts: Vec<String> = Vec::new();
        let mut all_scores: Vec<f32> = Vec::new();
        let mut processed = 0usize;
        let mut skipped = 0usize;

        while let Some(range) = planner.next() {
            match range {
                ChunkRange::Processable {
                    start,
                    end,
                    payload,
                } => {
                    let range_label = format!("{} (pages {}-{})", label, start + 1, end);
                    match self.annotate_with_retry(&payload, "application/pdf").await {
                        Ok(annotation) => {
                            processed += 1;
                            all_scores.extend(annotation.symbol_confidences);
                            if let Some(text) = normalize(Some(&annotation.text)) {
                                parts.push(text);
                            } else {
                                info!("no text found in {}", range_label);
                            }
                        }
                        Err(e) => {
                            // Lossy-tolerant: drop this range, keep going.
                            skipped += 1;
                            warn!("OCR failed for {}: {}, skipping range", range_label, e);
                        }
                    }
                }
                ChunkRange::Skipped { start, end, reason } => {
                    skipped += 1;
                    warn!(
                        "pages {}-{} of {} not processed: {}",
                        start + 1,
                        end,
                        label,
                        reason
                    );
                }
            }
        }

        info!(
            "chunked OCR completed for {}: {} ranges processed, {} skipped",
            label, processed, skipped
        );

        let confidence = average_confidence(&all_scores);
        warn_if_low(confidence, label);

        if parts.is_empty() {
            return Ok(None);
        }
        let text = parts.join("\n\n");
        let char_count = text.chars().count();
        Ok(Some(OcrResult {
            text: Some(text),
            confidence,
            char_count,
        }))
    }
}
