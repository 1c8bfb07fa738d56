//! Stable span hashes.

use sha2::{Digest, Sha256};

use crate::normalize::normalize_for_hash;

/// Field separator inside the digest input; never appears in tags.
const SEP: &[u8] = &[0x1f];

/// Computes the span hash: SHA-256 over
/// `normalized(text) ∥ 0x1F ∥ kind_tag ∥ 0x1F ∥ sub_language`.
///
/// The hash is a pure function of content, kind, and sub-language; byte
/// offsets deliberately do not participate, so a definition that moves
/// within its file keeps its identity.
pub fn span_hash(text: &str, kind_tag: &str, sub_language: &str) -> String {
    let mut h = Sha256::new();
    h.update(normalize_for_hash(text).as_bytes());
    h.update(SEP);
    h.update(kind_tag.as_bytes());
    h.update(SEP);
    h.update(sub_language.as_bytes());
    format!("{:x}", h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_cosmetic_changes() {
        let a = span_hash("fn alpha() {}\n", "function", "rust");
        let b = span_hash("fn alpha() {}   \r\n", "function", "rust");
        assert_eq!(a, b);
    }

    #[test]
    fn kind_and_language_participate() {
        let base = span_hash("x", "function", "rust");
        assert_ne!(base, span_hash("x", "class", "rust"));
        assert_ne!(base, span_hash("x", "function", "python"));
    }
}
