use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{IngestionRecord, InsertOutcome, NoteRef};

/// Postgres unique-violation SQLSTATE. A duplicate key on insert means a
/// concurrent worker (or an earlier run) already ingested the same URL.
const UNIQUE_VIOLATION: &str = "23505";

/// Seam to the relational store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn note_exists(&self, storage_url: &str) -> Result<bool>;
    async fn book_exists(&self, storage_url: &str) -> Result<bool>;
    /// Upsert keyed on the deterministic subject id; racing workers converge
    /// on the same row without a prior read.
    async fn ensure_subject(&self, id: Uuid, branch: &str, period: &str, name: &str)
        -> Result<()>;
    async fn insert_note(&self, record: &IngestionRecord) -> Result<InsertOutcome>;
    async fn insert_book(&self, record: &IngestionRecord) -> Result<InsertOutcome>;
    async fn update_note_ocr(&self, id: Uuid, ocr_text: &str) -> Result<()>;
    /// Notes still waiting on OCR; with `include_completed` every note is
    /// returned (the force-reprocess path).
    async fn notes_missing_ocr(&self, include_completed: bool) -> Result<Vec<NoteRef>>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        info!("connected to record store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn url_exists(&self, table: &str, storage_url: &str) -> Result<bool> {
        // Table name comes from a fixed internal set, never from input.
        let sql = format!("SELECT 1 FROM {} WHERE s3_url = $1 LIMIT 1", table);
        let row = sqlx::query(&sql)
            .bind(storage_url)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("existence check failed for {}", table))?;
        Ok(row.is_some())
    }

    async fn insert_record(&self, table: &str, record: &IngestionRecord) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO {} (id, subject_id, branch, semester, subject, file_name, s3_url, ocr_text, is_ocr_done) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            table
        );
        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(record.subject_id)
            .bind(&record.branch)
            .bind(&record.period)
            .bind(&record.subject)
            .bind(&record.file_name)
            .bind(&record.storage_url)
            .bind(&record.ocr_text)
            .bind(record.ocr_done)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                info!(
                    "record already exists (caught duplicate): {}",
                    record.file_name
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e).with_context(|| format!("insert into {} failed", table)),
        }
    }
}

#[async_trait]
impl MetadataStore for Database {
    async fn note_exists(&self, storage_url: &str) -> Result<bool> {
        self.url_exists("notes", storage_url).await
    }

    async fn book_exists(&self, storage_url: &str) -> Result<bool> {
        self.url_exists("books", storage_url).await
    }

    async fn ensure_subject(
        &self,
        id: Uuid,
        branch: &str,
        period: &str,
        name: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO subjects (id, branch, semester, name) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(branch)
        .bind(period)
        .bind(name)
        .execute(&self.pool)
        .await
        .context("subject upsert failed")?;
        Ok(())
    }

    async fn insert_note(&self, record: &IngestionRecord) -> Result<InsertOutcome> {
        self.insert_record("notes", record).await
    }

    async fn insert_book(&self, record: &IngestionRecord) -> Result<InsertOutcome> {
        self.insert_record("books", record).await
    }

    async fn update_note_ocr(&self, id: Uuid, ocr_text: &str) -> Result<()> {
        sqlx::query("UPDATE notes SET ocr_text = $2, is_ocr_done = TRUE WHERE id = $1")
            .bind(id)
            .bind(ocr_text)
            .execute(&self.pool)
            .await
            .with_context(|| format!("OCR update failed for note {}", id))?;
        Ok(())
    }

    async fn notes_missing_ocr(&self, include_completed: bool) -> Result<Vec<NoteRef>> {
        let sql = if include_completed {
            "SELECT id, s3_url FROM notes"
        } else {
            "SELECT id, s3_url FROM notes WHERE NOT is_ocr_done"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("query for notes missing OCR failed")?;
        Ok(rows
            .into_iter()
            .map(|row| NoteRef {
                id: row.get("id"),
                storage_url: row.get("s3_url"),
            })
            .collect())
    }
}
