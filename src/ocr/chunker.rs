use crate::ocr::error::OcrError;
use std::io::Cursor;
use tracing::{debug, info, warn};

use crate::models::human_readable_size;

/// Page-extraction capability the planner depends on. The production
/// implementation sits on lopdf; tests substitute synthetic page sizes.
/// Slicers are borrowed across await points inside spawned workers, so the
/// trait requires `Send + Sync`.
pub trait PdfSlicer: Send + Sync {
    fn page_count(&self) -> usize;
    /// Serializes pages `[start, end)` (zero-based) as a standalone PDF.
    fn slice(&self, start: usize, end: usize) -> Result<Vec<u8>, OcrError>;
}

/// One emitted range of the chunk plan. Ranges partition the document's
/// full page range exactly once, in order.
#[derive(Debug)]
pub enum ChunkRange {
    /// Serialized payload fits the inline limit and should be OCRed.
    Processable {
        start: usize,
        end: usize,
        payload: Vec<u8>,
    },
    /// Could not be brought under the limit (or could not be serialized);
    /// its pages are dropped from the result.
    Skipped {
        start: usize,
        end: usize,
        reason: String,
    },
}

impl ChunkRange {
    pub fn pages(&self) -> (usize, usize) {
        match self {
            ChunkRange::Processable { start, end, .. } => (*start, *end),
            ChunkRange::Skipped { start, end, .. } => (*start, *end),
        }
    }
}

/// Lazy shrink-and-retry chunk planner.
///
/// The window starts at `start_chunk_pages` and halves (floor, minimum one
/// page) whenever the serialized candidate exceeds the inline limit,
/// retrying the same starting page. A single page that still exceeds the
/// limit is emitted as skipped. After each emitted range the window doubles
/// back toward the start width, so one pathological page does not penalize
/// the rest of the document.
pub struct ChunkPlanner<'a> {
    slicer: &'a dyn PdfSlicer,
    inline_limit: u64,
    start_chunk_pages: usize,
    chunk_pages: usize,
    next_page: usize,
    total_pages: usize,
    label: String,
}

impl<'a> ChunkPlanner<'a> {
    pub fn new(
        slicer: &'a dyn PdfSlicer,
        inline_limit: u64,
        start_chunk_pages: usize,
        label: &str,
    ) -> Self {
        let start_chunk_pages = start_chunk_pages.max(1);
        Self {
            slicer,
            inline_limit,
            start_chunk_pages,
            chunk_pages: start_chunk_pages,
            next_page: 0,
            total_pages: slicer.page_count(),
            label: label.to_string(),
        }
    }
}

impl Iterator for ChunkPlanner<'_> {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        // Terminates: the window is bounded below by one page and the start
        // page strictly advances on every emitted range.
        loop {
            if self.next_page >= self.total_pages {
                return None;
            }

            let start = self.next_page;
            let end = (start + self.chunk_pages).min(self.total_pages);

            let payload = match self.slicer.slice(start, end) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        "failed to serialize pages {}-{} of {}: {}",
                        start + 1,
                        end,
                        self.label,
                        e
                    );
                    self.next_page = end;
                    return Some(ChunkRange::Skipped {
                        start,
                        end,
                        reason: e.to_string(),
                    });
                }
            };

            let size = payload.len() as u64;
            if size > self.inline_limit {
                if self.chunk_pages > 1 {
                    let previous = self.chunk_pages;
                    self.chunk_pages = (self.chunk_pages / 2).max(1);
                    info!(
                        "chunk of pages {}-{} is {} (> {}); reducing window {} -> {}",
                        start + 1,
                        end,
                        human_readable_size(size),
                        human_readable_size(self.inline_limit),
                        previous,
                        self.chunk_pages
                    );
                    // Shrink-and-retry: same starting page, smaller window.
                    continue;
                }

                warn!(
                    "single page {} of {} is {} and exceeds the inline limit; skipping",
                    start + 1,
                    self.label,
                    human_readable_size(size)
                );
                self.next_page = end;
                return Some(ChunkRange::Skipped {
                    start,
                    end,
                    reason: format!(
                        "page exceeds inline limit ({} > {})",
                        human_readable_size(size),
                        human_readable_size(self.inline_limit)
                    ),
                });
            }

            debug!(
                "planned chunk: pages {}-{} of {} ({})",
                start + 1,
                end,
                self.total_pages,
                human_readable_size(size)
            );
            self.next_page = end;
            if self.chunk_pages < self.start_chunk_pages {
                self.chunk_pages = (self.chunk_pages * 2).min(self.start_chunk_pages);
            }
            return Some(ChunkRange::Processable {
                start,
                end,
                payload,
            });
        }
    }
}

/// lopdf-backed slicer over an in-memory PDF.
pub struct LopdfSlicer {
    document: lopdf::Document,
    page_count: usize,
}

impl LopdfSlicer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OcrError> {
        let document =
            lopdf::Document::load_mem(bytes).map_err(|e| OcrError::PdfUnreadable {
                details: e.to_string(),
            })?;
        let page_count = document.get_pages().len();
        Ok(Self {
            document,
            page_count,
        })
    }
}

impl PdfSlicer for LopdfSlicer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn slice(&self, start: usize, end: usize) -> Result<Vec<u8>, OcrError> {
        // lopdf numbers pages from one; keep everything in [start, end) and
        // delete the rest from a working copy.
        let doomed: Vec<u32> = (1..=self.page_count as u32)
            .filter(|p| {
                let idx = (*p - 1) as usize;
                idx < start || idx >= end
            })
            .collect();

        let mut working = self.document.clone();
        if !doomed.is_empty() {
            working.delete_pages(&doomed);
        }
        working.prune_objects();

        let mut buf = Cursor::new(Vec::new());
        working
            .save_to(&mut buf)
            .map_err(|e| OcrError::PdfUnreadable {
                details: e.to_string(),
            })?;
        Ok(buf.into_inner())
    }
}
