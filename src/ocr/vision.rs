use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::ocr::error::OcrError;

/// Raw output of one OCR service call, before any cleanup.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub text: String,
    pub symbol_confidences: Vec<f32>,
}

/// Seam to the external OCR service.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn annotate(&self, bytes: &[u8], mime_type: &str) -> Result<Annotation, OcrError>;
}

/// Google Vision REST client. Images go through `images:annotate`, PDFs
/// through `files:annotate`; both request DOCUMENT_TEXT_DETECTION, which
/// handles scanned and printed material better than plain text detection.
pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_seconds: u64,
}

impl VisionClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OcrError::Transport)?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_seconds: timeout.as_secs(),
        })
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, OcrError> {
        let url = format!("{}/{}?key={}", self.endpoint, path, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout {
                        seconds: self.timeout_seconds,
                    }
                } else {
                    OcrError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(OcrError::ServiceError {
                status: status.as_u16(),
                details,
            });
        }

        response.json().await.map_err(OcrError::Transport)
    }

    async fn annotate_image(&self, bytes: &[u8]) -> Result<Annotation, OcrError> {
        let body = json!({
            "requests": [{
                "image": { "content": Base64::encode_string(bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
            }]
        });
        let raw = self.post("images:annotate", body).await?;
        let parsed: BatchAnnotateResponse =
            serde_json::from_value(raw).map_err(|e| OcrError::ServiceRejected {
                details: format!("unparseable response: {}", e),
            })?;

        let first = parsed.responses.into_iter().next().unwrap_or_default();
        first.into_annotation()
    }

    async fn annotate_pdf(&self, bytes: &[u8]) -> Result<Annotation, OcrError> {
        let body = json!({
            "requests": [{
                "inputConfig": {
                    "content": Base64::encode_string(bytes),
                    "mimeType": "application/pdf"
                },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
            }]
        });
        let raw = self.post("files:annotate", body).await?;
        let parsed: BatchAnnotateFilesResponse =
            serde_json::from_value(raw).map_err(|e| OcrError::ServiceRejected {
                details: format!("unparseable response: {}", e),
            })?;

        // Per-page responses are folded into one document annotation.
        let mut merged = Annotation::default();
        let file_response = parsed.responses.into_iter().next().unwrap_or_default();
        for page_response in file_response.responses.unwrap_or_default() {
            let page = page_response.into_annotation()?;
            if !page.text.is_empty() {
                if !merged.text.is_empty() {
                    merged.text.push_str("\n\n");
                }
                merged.text.push_str(&page.text);
            }
            merged.symbol_confidences.extend(page.symbol_confidences);
        }
        debug!(
            "files:annotate returned {} chars, {} symbols",
            merged.text.len(),
            merged.symbol_confidences.len()
        );
        Ok(merged)
    }
}

#[async_trait]
impl OcrEngine for VisionClient {
    async fn annotate(&self, bytes: &[u8], mime_type: &str) -> Result<Annotation, OcrError> {
        if mime_type == "application/pdf" {
            self.annotate_pdf(bytes).await
        } else {
            self.annotate_image(bytes).await
        }
    }
}

// Wire types: only the fields the pipeline consumes.

#[derive(Debug, Deserialize, Default)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Debug, Deserialize, Default)]
struct BatchAnnotateFilesResponse {
    #[serde(default)]
    responses: Vec<AnnotateFileResponse>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateFileResponse {
    responses: Option<Vec<AnnotateResponse>>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateResponse {
    #[serde(rename = "fullTextAnnotation")]
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<ApiStatus>,
}

impl AnnotateResponse {
    fn into_annotation(self) -> Result<Annotation, OcrError> {
        if let Some(error) = self.error {
            return Err(OcrError::ServiceRejected {
                details: error.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        let Some(full_text) = self.full_text_annotation else {
            return Ok(Annotation::default());
        };

        let mut symbol_confidences = Vec::new();
        for page in full_text.pages.unwrap_or_default() {
            for block in page.blocks.unwrap_or_default() {
                for paragraph in block.paragraphs.unwrap_or_default() {
                    for word in paragraph.words.unwrap_or_default() {
                        for symbol in word.symbols.unwrap_or_default() {
                            if let Some(confidence) = symbol.confidence {
                                symbol_confidences.push(confidence);
                            }
                        }
                    }
                }
            }
        }

        Ok(Annotation {
            text: full_text.text.unwrap_or_default(),
            symbol_confidences,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    text: Option<String>,
    pages: Option<Vec<TextPage>>,
}

#[derive(Debug, Deserialize)]
struct TextPage {
    blocks: Option<Vec<TextBlock>>,
}

#[derive(Debug, Deserialize)]
struct TextBlock {
    paragraphs: Option<Vec<TextParagraph>>,
}

#[derive(Debug, Deserialize)]
struct TextParagraph {
    words: Option<Vec<TextWord>>,
}

#[derive(Debug, Deserialize)]
struct TextWord {
    symbols: Option<Vec<TextSymbol>>,
}

#[derive(Debug, Deserialize)]
struct TextSymbol {
    confidence: Option<f32>,
}
