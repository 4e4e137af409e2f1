use uuid::Uuid;

use crate::models::TaxonomyPath;

/// Content headers attached to an uploaded object, selected by file
/// category so browsers render documents and images inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeaders {
    pub content_type: String,
    pub content_disposition: &'static str,
    pub cache_control: &'static str,
    pub archive_type: &'static str,
}

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "tiff", "svg"];

/// Keeps only the digits of the period component ("Year 2" -> "2",
/// "Semester-3" -> "3"); components without digits pass through unchanged.
pub fn normalize_period(period: &str) -> String {
    let digits: String = period.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        period.to_string()
    } else {
        digits
    }
}

/// Deterministic object key:
/// `{branch}/{normalized_period}/{subject}/{resource_type|Notes}/{file_name}`.
/// The same taxonomy and file name always yield the same key; this is the
/// idempotency anchor for both upload placement and existence lookups.
pub fn storage_key(taxonomy: &TaxonomyPath, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        taxonomy.branch,
        normalize_period(&taxonomy.period),
        taxonomy.subject,
        taxonomy.resource_type.as_deref().unwrap_or("Notes"),
        file_name
    )
}

/// Externally-visible URL for a stored object.
pub fn storage_url(bucket: &str, taxonomy: &TaxonomyPath, file_name: &str) -> String {
    format!(
        "https://{}.s3.amazonaws.com/{}",
        bucket,
        storage_key(taxonomy, file_name)
    )
}

/// Stable subject identifier: UUIDv5 over (branch, normalized period,
/// subject name). The same triple always maps to the same id, so racing
/// upserts converge instead of creating siblings.
pub fn subject_id(taxonomy: &TaxonomyPath) -> Uuid {
    let name = format!(
        "{}-{}-{}",
        taxonomy.branch,
        normalize_period(&taxonomy.period),
        taxonomy.subject
    );
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

/// Picks headers by category: documents inline with a 30-day cache, images
/// inline with a 1-year cache, everything else as a 7-day download.
pub fn content_headers(file_name: &str) -> ContentHeaders {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mime_type = mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .to_string();

    if extension == "pdf" {
        return ContentHeaders {
            content_type: "application/pdf".to_string(),
            content_disposition: "inline",
            cache_control: "public, max-age=2592000",
            archive_type: "document",
        };
    }
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return ContentHeaders {
            content_type: mime_type,
            content_disposition: "inline",
            cache_control: "public, max-age=31536000",
            archive_type: "image",
        };
    }
    ContentHeaders {
        content_type: mime_type,
        content_disposition: "attachment",
        cache_control: "public, max-age=604800",
        archive_type: "file",
    }
}

/// MIME type for OCR dispatch, derived from the file extension the same
/// way the uploader derives it.
pub fn ocr_mime_type(file_name: &str) -> String {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => "application/pdf".to_string(),
        "jpg" => "image/jpeg".to_string(),
        other => format!("image/{}", other),
    }
}
