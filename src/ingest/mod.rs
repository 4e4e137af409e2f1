pub mod backfill;
pub mod batch;
pub mod orchestrator;

pub use backfill::BackfillRunner;
pub use batch::BatchCoordinator;
pub use orchestrator::{FileOutcome, Orchestrator};

/// What a batch run does with each collected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    NotesWithOcr,
    NotesWithoutOcr,
    Books,
}

impl IngestMode {
    pub fn is_books(&self) -> bool {
        matches!(self, IngestMode::Books)
    }

    pub fn wants_ocr(&self) -> bool {
        matches!(self, IngestMode::NotesWithOcr)
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestMode::NotesWithOcr => "notes with OCR",
            IngestMode::NotesWithoutOcr => "notes without OCR",
            IngestMode::Books => "books",
        }
    }
}
