use crate::config::OCR_MIN_CONFIDENCE;
use tracing::warn;

/// Arithmetic mean of the positive per-symbol scores, or 0.0 when there are
/// none. Zero scores come from blank regions and are excluded from the
/// denominator so an empty page cannot drag an otherwise clean document
/// under the review threshold.
pub fn average_confidence(symbol_scores: &[f32]) -> f32 {
    let positive: Vec<f32> = symbol_scores.iter().copied().filter(|s| *s > 0.0).collect();
    if positive.is_empty() {
        return 0.0;
    }
    positive.iter().sum::<f32>() / positive.len() as f32
}

/// Logs the review warning for low-confidence results. Never gates storage:
/// low-confidence text is still persisted.
pub fn warn_if_low(confidence: f32, label: &str) {
    if confidence > 0.0 && confidence < OCR_MIN_CONFIDENCE {
        warn!(
            "low OCR confidence ({:.1}%) for {}, may need manual review",
            confidence * 100.0,
            label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scores_give_zero() {
        assert_eq!(average_confidence(&[]), 0.0);
    }

    #[test]
    fn zero_scores_are_excluded_from_denominator() {
        // A blank page contributes zeros; only the positives count.
        assert!((average_confidence(&[0.0, 0.8, 0.6, 0.0]) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn all_blank_pages_give_zero() {
        assert_eq!(average_confidence(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn mean_of_positive_scores() {
        assert!((average_confidence(&[0.2, 0.4, 0.6]) - 0.4).abs() < 1e-6);
    }
}
