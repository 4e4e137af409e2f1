//! OCR backfill over already-uploaded notes, with the download leg served
//! by a stubbed HTTP server.

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docvault::ingest::BackfillRunner;
use docvault::models::{FailureReason, NoteRef};
use docvault::ocr::OcrDispatcher;

use docvault::ocr::error::OcrError;

use helpers::{fast_retry, MockMetadataStore, ScriptedEngine};

const RECOVERED_TEXT: &str = "Recovered lecture notes on entropy.";

fn note(server: &MockServer, file: &str) -> NoteRef {
    NoteRef {
        id: Uuid::new_v4(),
        storage_url: format!("{}/archive/{}", server.uri(), file),
    }
}

fn runner(
    records: Arc<MockMetadataStore>,
    engine: Arc<ScriptedEngine>,
    dry_run: bool,
) -> BackfillRunner {
    let dispatcher =
        Arc::new(OcrDispatcher::new(engine, 40 * 1024 * 1024, 5).with_retry(fast_retry()));
    BackfillRunner::new(records, dispatcher, Duration::from_secs(5), dry_run).unwrap()
}

#[tokio::test]
async fn downloads_ocrs_and_writes_text_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive/scan.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let pending = note(&server, "scan.jpg");
    let note_id = pending.id;
    let records = Arc::new(MockMetadataStore::default());
    records.backlog.lock().unwrap().push(pending);
    let engine = Arc::new(ScriptedEngine::always(RECOVERED_TEXT, &[0.9]));

    let report = runner(records.clone(), engine.clone(), false)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(engine.call_count(), 1);

    let updates = records.ocr_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0], (note_id, RECOVERED_TEXT.to_string()));
}

#[tokio::test]
async fn missing_object_counts_as_download_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let records = Arc::new(MockMetadataStore::default());
    records.backlog.lock().unwrap().push(note(&server, "gone.jpg"));
    let engine = Arc::new(ScriptedEngine::always(RECOVERED_TEXT, &[0.9]));

    let report = runner(records.clone(), engine.clone(), false)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(
        report.failure_details[0].reason,
        FailureReason::DownloadFailed
    );
    assert_eq!(engine.call_count(), 0);
    assert!(records.ocr_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ocr_rejection_is_classified_as_an_ocr_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive/odd.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .mount(&server)
        .await;

    let records = Arc::new(MockMetadataStore::default());
    records.backlog.lock().unwrap().push(note(&server, "odd.jpg"));
    let engine = Arc::new(ScriptedEngine::scripted(vec![Err(
        OcrError::ServiceRejected {
            details: "unsupported image".to_string(),
        },
    )]));

    let report = runner(records.clone(), engine, false)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.failure_details[0].reason, FailureReason::OcrFailed);
    assert!(records.ocr_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unusable_text_is_a_skip_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive/blank.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .mount(&server)
        .await;

    let records = Arc::new(MockMetadataStore::default());
    records.backlog.lock().unwrap().push(note(&server, "blank.jpg"));
    // Cleans down to below the minimum usable length.
    let engine = Arc::new(ScriptedEngine::always("ix", &[0.9]));

    let report = runner(records.clone(), engine, false)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(records.ocr_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_extracts_but_never_writes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive/scan.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .mount(&server)
        .await;

    let records = Arc::new(MockMetadataStore::default());
    records.backlog.lock().unwrap().push(note(&server, "scan.jpg"));
    let engine = Arc::new(ScriptedEngine::always(RECOVERED_TEXT, &[0.9]));

    let report = runner(records.clone(), engine.clone(), true)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(engine.call_count(), 1);
    assert!(records.ocr_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_backlog_finishes_without_work() {
    let records = Arc::new(MockMetadataStore::default());
    let engine = Arc::new(ScriptedEngine::always(RECOVERED_TEXT, &[0.9]));

    let report = runner(records, engine.clone(), false)
        .run(2, false)
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(report.completed(), 0);
    assert!(report.finished_at.is_some());
    assert_eq!(engine.call_count(), 0);
}
