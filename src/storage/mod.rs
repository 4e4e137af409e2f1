pub mod key;
pub mod s3;

pub use key::{content_headers, ocr_mime_type, storage_key, storage_url, subject_id, ContentHeaders};
pub use s3::{ObjectStore, S3Store};
