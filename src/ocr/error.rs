use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR service rejected the request: {details}")]
    ServiceRejected { details: String },

    #[error("OCR service error (status {status}): {details}")]
    ServiceError { status: u16, details: String },

    #[error("OCR request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("payload of {size} bytes exceeds the inline limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("failed to read PDF: {details}")]
    PdfUnreadable { details: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OcrError {
    /// Transient errors are worth another attempt; the rest fail the file.
    pub fn is_transient(&self) -> bool {
        match self {
            OcrError::Timeout { .. } => true,
            OcrError::ServiceError { status, .. } => *status >= 500 || *status == 429,
            OcrError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            OcrError::ServiceRejected { .. } => "OCR_REJECTED",
            OcrError::ServiceError { .. } => "OCR_SERVICE_ERROR",
            OcrError::Timeout { .. } => "OCR_TIMEOUT",
            OcrError::PayloadTooLarge { .. } => "OCR_PAYLOAD_TOO_LARGE",
            OcrError::PdfUnreadable { .. } => "OCR_PDF_UNREADABLE",
            OcrError::Transport(_) => "OCR_TRANSPORT",
            OcrError::Other(_) => "OCR_UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        assert!(OcrError::Timeout { seconds: 120 }.is_transient());
        assert!(OcrError::ServiceError {
            status: 503,
            details: "unavailable".into()
        }
        .is_transient());
        assert!(OcrError::ServiceError {
            status: 429,
            details: "slow down".into()
        }
        .is_transient());
        assert!(!OcrError::ServiceRejected {
            details: "bad image".into()
        }
        .is_transient());
    }

    #[test]
    fn error_codes_are_stable() {
        let err = OcrError::PayloadTooLarge {
            size: 50,
            limit: 40,
        };
        assert_eq!(err.error_code(), "OCR_PAYLOAD_TOO_LARGE");
    }
}
