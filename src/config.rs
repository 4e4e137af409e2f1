use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Vision-style inline payload ceiling: PDFs above this must be chunked.
pub const INLINE_SIZE_LIMIT: u64 = 40 * 1024 * 1024;
/// Starting page-window width for adaptive PDF chunking.
pub const DEFAULT_CHUNK_PAGES: usize = 5;
/// Symbol-confidence floor below which a "review" warning is logged.
pub const OCR_MIN_CONFIDENCE: f32 = 0.3;
/// Cleaned OCR output shorter than this is treated as no signal.
pub const OCR_TEXT_MIN_LENGTH: usize = 10;
/// Default bounded-pool width. Kept low on purpose: the bottleneck is the
/// rate-limited OCR/storage APIs, not local CPU.
pub const DEFAULT_WORKERS: usize = 2;

pub const VALID_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tiff", "gif", "pdf"];

/// Environment-backed configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub s3_endpoint_url: Option<String>,
    pub vision_api_key: String,
    pub vision_endpoint: String,
    pub base_path: PathBuf,
    pub http_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            s3_bucket: env::var("S3_BUCKET_NAME").unwrap_or_default(),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "eu-north-1".to_string()),
            aws_access_key_id: env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            aws_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            s3_endpoint_url: env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            vision_api_key: env::var("VISION_API_KEY").unwrap_or_default(),
            vision_endpoint: env::var("VISION_ENDPOINT")
                .unwrap_or_else(|_| "https://vision.googleapis.com/v1".to_string()),
            base_path: env::var("DOCVAULT_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./ArchiveData")),
            http_timeout_seconds: env::var("HTTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
        })
    }

    /// Fails fast with every missing requirement listed, before any batch
    /// work starts. Validation failures are the only errors that reach the
    /// process boundary with a distinct exit code.
    pub fn validate(&self, needs_base_path: bool) -> Result<()> {
        let mut problems = Vec::new();

        if self.database_url.is_empty() {
            problems.push("DATABASE_URL not set".to_string());
        }
        if self.s3_bucket.is_empty() {
            problems.push("S3_BUCKET_NAME not set".to_string());
        }
        if self.aws_access_key_id.is_empty() {
            problems.push("AWS_ACCESS_KEY_ID not set".to_string());
        }
        if self.aws_secret_access_key.is_empty() {
            problems.push("AWS_SECRET_ACCESS_KEY not set".to_string());
        }
        if self.vision_api_key.is_empty() {
            problems.push("VISION_API_KEY not set".to_string());
        }
        if needs_base_path && !self.base_path.is_dir() {
            problems.push(format!(
                "base path is not a directory: {}",
                self.base_path.display()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "startup validation failed:\n  - {}",
                problems.join("\n  - ")
            ))
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Per-run options resolved from CLI flags. Built once in main and passed
/// by reference; nothing in the pipeline mutates it.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub base_path: PathBuf,
    pub start_chunk_pages: usize,
    pub workers: usize,
    pub dry_run: bool,
    pub force_ocr: bool,
    pub inline_size_limit: u64,
}

impl RunOptions {
    pub fn new(base_path: &Path, start_chunk_pages: usize, workers: usize) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            start_chunk_pages: start_chunk_pages.max(1),
            workers: workers.max(1),
            dry_run: false,
            force_ocr: false,
            inline_size_limit: INLINE_SIZE_LIMIT,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_force_ocr(mut self, force_ocr: bool) -> Self {
        self.force_ocr = force_ocr;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_config() -> Config {
        Config {
            database_url: String::new(),
            s3_bucket: String::new(),
            s3_region: "eu-north-1".to_string(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            s3_endpoint_url: None,
            vision_api_key: String::new(),
            vision_endpoint: "https://vision.googleapis.com/v1".to_string(),
            base_path: PathBuf::from("/definitely/not/a/real/path"),
            http_timeout_seconds: 120,
        }
    }

    #[test]
    fn validation_lists_every_missing_requirement() {
        let err = blank_config().validate(true).unwrap_err().to_string();
        assert!(err.contains("DATABASE_URL"));
        assert!(err.contains("S3_BUCKET_NAME"));
        assert!(err.contains("VISION_API_KEY"));
        assert!(err.contains("base path"));
    }

    #[test]
    fn validation_passes_with_all_requirements() {
        let mut config = blank_config();
        config.database_url = "postgresql://localhost/archive".to_string();
        config.s3_bucket = "archive-bucket".to_string();
        config.aws_access_key_id = "AKIA".to_string();
        config.aws_secret_access_key = "secret".to_string();
        config.vision_api_key = "key".to_string();
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn run_options_clamp_to_sane_minimums() {
        let opts = RunOptions::new(Path::new("."), 0, 0);
        assert_eq!(opts.start_chunk_pages, 1);
        assert_eq!(opts.workers, 1);
    }
}
