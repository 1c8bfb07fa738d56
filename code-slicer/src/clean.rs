//! Text cleanliness check.
//!
//! Binary garbage in the vector store poisons retrieval, so spans must be
//! valid UTF-8 (or printable latin-1) with no NUL bytes and only a trace
//! amount of control characters.

/// Maximum tolerated share of disallowed control characters.
const MAX_CONTROL_RATIO: f32 = 0.02;

/// Returns `true` when `bytes` look like clean text.
pub fn is_clean_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }
    if bytes.contains(&0) {
        return false;
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => control_ratio(s.chars()) <= MAX_CONTROL_RATIO,
        // Not UTF-8: accept only if every byte is printable latin-1 or
        // ordinary whitespace.
        Err(_) => {
            let bad = bytes
                .iter()
                .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
                .count();
            bytes.iter().all(|&b| b >= 0x20 || matches!(b, b'\n' | b'\r' | b'\t'))
                || (bad as f32 / bytes.len() as f32) <= MAX_CONTROL_RATIO
        }
    }
}

fn control_ratio(chars: impl Iterator<Item = char>) -> f32 {
    let mut total = 0usize;
    let mut bad = 0usize;
    for c in chars {
        total += 1;
        if (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) || c == '\u{fffd}' {
            bad += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        bad as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_source_is_clean() {
        assert!(is_clean_text(b"fn main() {\n    println!(\"hi\");\n}\n"));
    }

    #[test]
    fn nul_bytes_are_binary() {
        assert!(!is_clean_text(b"ELF\x00\x01\x02"));
    }

    #[test]
    fn latin1_text_is_accepted() {
        // "café" in latin-1: 0xE9 is not valid UTF-8 on its own.
        assert!(is_clean_text(&[b'c', b'a', b'f', 0xE9, b'\n']));
    }

    #[test]
    fn control_soup_is_rejected() {
        let junk: Vec<u8> = (1u8..16).chain(1..16).chain(1..16).collect();
        assert!(!is_clean_text(&junk));
    }
}
