use crate::config::OCR_TEXT_MIN_LENGTH;

/// Cleans raw OCR output into canonical text.
///
/// Control characters other than newline, tab and carriage return are
/// stripped, runs of spaces and tabs collapse to a single space, and three
/// or more consecutive newlines collapse to exactly two so paragraph breaks
/// survive. Returns `None` when the input is missing or the cleaned result
/// is shorter than the minimum length; short fragments are no-signal, not
/// noisy text.
pub fn normalize(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    let filtered: String = raw
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect();

    // Collapse horizontal whitespace per line, then cap blank runs.
    let mut lines: Vec<String> = Vec::new();
    for line in filtered.replace('\r', "").split('\n') {
        lines.push(line.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    let mut text = String::new();
    let mut blank_run = 0usize;
    for line in &lines {
        if line.is_empty() {
            blank_run += 1;
            // At most one blank line between paragraphs.
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(line);
    }

    let text = text.trim_matches('\n').trim().to_string();
    if text.chars().count() >= OCR_TEXT_MIN_LENGTH {
        Some(text)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "Thermo\u{0}dynamics\u{7} chapter one";
        assert_eq!(
            normalize(Some(raw)),
            Some("Thermodynamics chapter one".to_string())
        );
    }

    #[test]
    fn collapses_whitespace_runs() {
        let raw = "first   law \t of    thermodynamics";
        assert_eq!(
            normalize(Some(raw)),
            Some("first law of thermodynamics".to_string())
        );
    }

    #[test]
    fn caps_newline_runs_at_two() {
        let raw = "paragraph one\n\n\n\n\nparagraph two";
        assert_eq!(
            normalize(Some(raw)),
            Some("paragraph one\n\nparagraph two".to_string())
        );
    }

    #[test]
    fn short_fragments_are_dropped() {
        assert_eq!(normalize(Some("ix")), None);
        assert_eq!(normalize(Some("   \n\n  ")), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn never_returns_below_minimum_length() {
        for raw in ["abcdefghi", "a b c", "123456789"] {
            if let Some(out) = normalize(Some(raw)) {
                assert!(out.chars().count() >= OCR_TEXT_MIN_LENGTH);
            }
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  leading and trailing   \n\n\n\nspaced   out  ",
            "plain sentence with enough length",
            "tabs\tbecome\tspaces here",
            "multi\n\nparagraph\n\n\ntext body",
        ];
        for raw in samples {
            let once = normalize(Some(raw));
            let twice = normalize(once.as_deref());
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }
}
