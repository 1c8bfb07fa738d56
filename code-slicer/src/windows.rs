//! Fixed-size overlapping windows for unknown file types.

use crate::types::{Slice, SliceKind, SlicerConfig};

/// Confidence attached to windowed slices; syntactic slicing always wins
/// the overlap tie-break against these.
const WINDOW_CONFIDENCE: f32 = 0.3;

/// Splits `text` into overlapping line windows starting at
/// `base_byte`/`base_line`. Order is by starting byte.
pub fn window_slices(
    text: &str,
    base_byte: usize,
    base_line: usize,
    sub_language: &str,
    cfg: &SlicerConfig,
) -> Vec<Slice> {
    let mut out = Vec::new();
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.is_empty() {
        return out;
    }

    let max_lines = cfg.window_lines.max(1);
    let step = max_lines.saturating_sub(cfg.window_overlap).max(1);
    let mut start_line = 0usize;

    while start_line < lines.len() {
        let end_line = (start_line + max_lines).min(lines.len());
        let start_byte_local: usize = lines[..start_line].iter().map(|s| s.len()).sum();
        let part: String = lines[start_line..end_line].iter().copied().collect();

        if !part.trim().is_empty() {
            out.push(Slice::build(
                &part,
                base_byte + start_byte_local,
                base_line + start_line,
                base_line + end_line,
                SliceKind::Generic,
                sub_language,
                WINDOW_CONFIDENCE,
                Vec::new(),
            ));
        }

        if end_line == lines.len() {
            break;
        }
        start_line += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(window: usize, overlap: usize) -> SlicerConfig {
        SlicerConfig {
            window_lines: window,
            window_overlap: overlap,
            ..SlicerConfig::default()
        }
    }

    #[test]
    fn windows_cover_whole_text_with_overlap() {
        let text: String = (0..10).map(|i| format!("line {i}\n")).collect();
        let slices = window_slices(&text, 0, 0, "text", &cfg(4, 1));

        assert!(!slices.is_empty());
        assert_eq!(slices[0].start_line, 0);
        assert_eq!(slices.last().unwrap().end_line, 10);
        // Consecutive windows overlap by one line.
        assert_eq!(slices[1].start_line, 3);
    }

    #[test]
    fn blank_windows_are_skipped() {
        let slices = window_slices("\n\n\n", 0, 0, "text", &cfg(2, 0));
        assert!(slices.is_empty());
    }

    #[test]
    fn offsets_are_absolute() {
        let slices = window_slices("abc\ndef\n", 100, 7, "text", &cfg(1, 0));
        assert_eq!(slices[0].start_byte, 100);
        assert_eq!(slices[1].start_byte, 104);
        assert_eq!(slices[1].start_line, 8);
    }
}
