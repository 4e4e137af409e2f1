pub mod collector;
pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod retry;
pub mod storage;

pub use config::{Config, RunOptions};
pub use models::{BatchReport, WorkItem};
