//! Content normalization for stable span hashes.
//!
//! Cosmetic edits must not invalidate embeddings, so the hash is computed
//! over a normalized form: line endings collapsed to `\n` and trailing
//! whitespace stripped per line. The emitted slice text stays raw.

/// Returns the normalized form of `text` used for hashing.
pub fn normalize_for_hash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    // A trailing newline was synthesized even for unterminated input;
    // keep it, it makes `foo` and `foo\n` hash identically on purpose.
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_crlf() {
        assert_eq!(normalize_for_hash("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn strips_trailing_whitespace_per_line() {
        assert_eq!(normalize_for_hash("fn x() {}   \n  y  \n"), "fn x() {}\n  y\n");
    }

    #[test]
    fn unterminated_and_terminated_agree() {
        assert_eq!(normalize_for_hash("foo"), normalize_for_hash("foo\n"));
    }
}
