//! Shared in-memory fakes for the orchestrator and batch tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

use docvault::config::RunOptions;
use docvault::db::MetadataStore;
use docvault::ingest::Orchestrator;
use docvault::models::{IngestionRecord, InsertOutcome, NoteRef, TaxonomyPath, WorkItem};
use docvault::ocr::error::OcrError;
use docvault::ocr::vision::{Annotation, OcrEngine};
use docvault::ocr::OcrDispatcher;
use docvault::retry::RetryPolicy;
use docvault::storage::key::ContentHeaders;
use docvault::storage::ObjectStore;

pub const TEST_BUCKET: &str = "archive-test";

/// Retry schedule with millisecond delays so retrying paths stay fast
/// under test.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 1.5,
    }
}

#[derive(Default)]
pub struct MockObjectStore {
    pub uploads: Mutex<Vec<String>>,
    /// Keys containing any of these fragments fail with a simulated outage.
    pub failing_fragments: Vec<String>,
    /// Keys containing any of these fragments panic mid-upload.
    pub panicking_fragments: Vec<String>,
}

impl MockObjectStore {
    pub fn failing_on(fragments: &[&str]) -> Self {
        Self {
            failing_fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn panicking_on(fragments: &[&str]) -> Self {
        Self {
            panicking_fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn upload(&self, _local_path: &Path, key: &str, _headers: &ContentHeaders) -> Result<()> {
        if self.panicking_fragments.iter().any(|f| key.contains(f)) {
            panic!("simulated worker crash for {}", key);
        }
        if self.failing_fragments.iter().any(|f| key.contains(f)) {
            return Err(anyhow!("simulated storage outage for {}", key));
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockMetadataStore {
    pub existing_urls: Mutex<HashSet<String>>,
    /// URLs that hit the duplicate-key path on insert even though the
    /// existence check missed them (simulated race).
    pub racing_urls: HashSet<String>,
    pub notes: Mutex<Vec<IngestionRecord>>,
    pub books: Mutex<Vec<IngestionRecord>>,
    pub subjects: Mutex<HashSet<Uuid>>,
    pub exists_checks: Mutex<usize>,
    /// Number of leading existence checks that fail with a transient error.
    pub transient_exists_failures: Mutex<usize>,
    pub backlog: Mutex<Vec<NoteRef>>,
    pub ocr_updates: Mutex<Vec<(Uuid, String)>>,
}

impl MockMetadataStore {
    pub fn with_existing(urls: &[String]) -> Self {
        Self {
            existing_urls: Mutex::new(urls.iter().cloned().collect()),
            ..Default::default()
        }
    }

    pub fn insert_count(&self) -> usize {
        self.notes.lock().unwrap().len() + self.books.lock().unwrap().len()
    }

    fn insert_into(
        &self,
        rows: &Mutex<Vec<IngestionRecord>>,
        record: &IngestionRecord,
    ) -> InsertOutcome {
        let mut rows = rows.lock().unwrap();
        let dup = self.racing_urls.contains(&record.storage_url)
            || rows.iter().any(|r| r.storage_url == record.storage_url);
        if dup {
            InsertOutcome::Duplicate
        } else {
            rows.push(record.clone());
            InsertOutcome::Inserted
        }
    }
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn note_exists(&self, storage_url: &str) -> Result<bool> {
        *self.exists_checks.lock().unwrap() += 1;
        {
            let mut remaining = self.transient_exists_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("connection reset by peer"));
            }
        }
        Ok(self.existing_urls.lock().unwrap().contains(storage_url))
    }

    async fn book_exists(&self, storage_url: &str) -> Result<bool> {
        self.note_exists(storage_url).await
    }

    async fn ensure_subject(
        &self,
        id: Uuid,
        _branch: &str,
        _period: &str,
        _name: &str,
    ) -> Result<()> {
        self.subjects.lock().unwrap().insert(id);
        Ok(())
    }

    async fn insert_note(&self, record: &IngestionRecord) -> Result<InsertOutcome> {
        Ok(self.insert_into(&self.notes, record))
    }

    async fn insert_book(&self, record: &IngestionRecord) -> Result<InsertOutcome> {
        Ok(self.insert_into(&self.books, record))
    }

    async fn update_note_ocr(&self, id: Uuid, ocr_text: &str) -> Result<()> {
        self.ocr_updates
            .lock()
            .unwrap()
            .push((id, ocr_text.to_string()));
        Ok(())
    }

    async fn notes_missing_ocr(&self, _include_completed: bool) -> Result<Vec<NoteRef>> {
        Ok(self.backlog.lock().unwrap().clone())
    }
}

/// OCR engine that replays a fixed script of responses in call order; an
/// empty script answers every call with the same canned annotation.
pub struct ScriptedEngine {
    script: Mutex<Vec<Result<Annotation, OcrError>>>,
    fallback: Annotation,
    pub calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedEngine {
    pub fn always(text: &str, confidences: &[f32]) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            fallback: Annotation {
                text: text.to_string(),
                symbol_confidences: confidences.to_vec(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(script: Vec<Result<Annotation, OcrError>>) -> Self {
        Self {
            script: Mutex::new(script),
            fallback: Annotation::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    async fn annotate(&self, bytes: &[u8], mime_type: &str) -> Result<Annotation, OcrError> {
        self.calls
            .lock()
            .unwrap()
            .push((mime_type.to_string(), bytes.len()));
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Ok(self.fallback.clone())
        } else {
            script.remove(0)
        }
    }
}

pub fn taxonomy() -> TaxonomyPath {
    TaxonomyPath {
        branch: "Mechanical".to_string(),
        period: "Year 2".to_string(),
        subject: "Thermodynamics".to_string(),
        resource_type: Some("Notes".to_string()),
    }
}

/// Creates a real file under `dir` and wraps it as a WorkItem.
pub fn work_item(dir: &Path, file_name: &str, content: &[u8]) -> WorkItem {
    let source_path = dir.join(file_name);
    std::fs::write(&source_path, content).unwrap();
    WorkItem {
        source_path,
        file_name: file_name.to_string(),
        taxonomy: taxonomy(),
    }
}

pub fn expected_url(file_name: &str) -> String {
    format!(
        "https://{}.s3.amazonaws.com/Mechanical/2/Thermodynamics/Notes/{}",
        TEST_BUCKET, file_name
    )
}

pub fn build_orchestrator(
    objects: Arc<MockObjectStore>,
    records: Arc<MockMetadataStore>,
    engine: Arc<ScriptedEngine>,
) -> Orchestrator {
    let dispatcher =
        Arc::new(OcrDispatcher::new(engine, 40 * 1024 * 1024, 5).with_retry(fast_retry()));
    let options = RunOptions::new(Path::new("."), 5, 2);
    Orchestrator::new(objects, records, dispatcher, TEST_BUCKET, options)
        .with_retry(fast_retry())
}
