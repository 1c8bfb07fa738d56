//! Semantic file slicing for the LLMC RAG core.
//!
//! Turns a file's bytes into an ordered sequence of spans with stable,
//! content-derived hashes. Supported code languages are walked with
//! tree-sitter; markdown is sliced by heading sections; everything else
//! falls back to fixed overlapping windows. The entry point never panics
//! and degrades to the generic strategy instead of failing a file.

pub mod clean;
pub mod errors;
mod hash;
mod languages;
mod markup;
mod normalize;
pub mod types;
mod windows;

pub use errors::{Error, Result};
pub use hash::span_hash;
pub use types::{
    DroppedSpan, FileSlices, Language, Slice, SliceFamily, SliceKind, SlicerConfig,
};

use tracing::{debug, warn};

/// Slices one file. `rel_path` is only used for language detection and
/// logging; `bytes` is the file content.
///
/// The result is ordered by starting byte. Spans that fail the text
/// cleanliness check are reported in [`FileSlices::dropped`] when
/// `enforce_clean_text` is set.
pub fn slice_file(rel_path: &str, bytes: &[u8], cfg: &SlicerConfig) -> Result<FileSlices> {
    let language = Language::detect(rel_path);

    // Whole-file cleanliness gate: binary files never reach a parser.
    if !clean::is_clean_text(bytes) {
        if cfg.enforce_clean_text {
            debug!(path = rel_path, "file failed cleanliness check, dropped");
            return Ok(FileSlices {
                language,
                slices: Vec::new(),
                dropped: vec![DroppedSpan {
                    start_byte: 0,
                    end_byte: bytes.len(),
                    reason: String::from("unclean_text"),
                }],
            });
        }
        // Tolerant mode: lossy-decode and window.
        let text = String::from_utf8_lossy(bytes).into_owned();
        let mut slices = windows::window_slices(&text, 0, 0, language.tag(), cfg);
        apply_domain(&mut slices, cfg.domain);
        return Ok(FileSlices {
            language,
            slices,
            dropped: Vec::new(),
        });
    }

    let text: String = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    };

    let mut slices = if bytes.len() > cfg.max_parse_bytes {
        debug!(
            path = rel_path,
            size = bytes.len(),
            "file exceeds parse limit, windowing"
        );
        windows::window_slices(&text, 0, 0, language.tag(), cfg)
    } else if language.has_grammar() {
        match languages::code_slices(&text, language, cfg) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = rel_path, error = %e, "code slicing failed, windowing");
                windows::window_slices(&text, 0, 0, language.tag(), cfg)
            }
        }
    } else if language == Language::Markdown {
        markup::section_slices(&text, cfg)
    } else {
        windows::window_slices(&text, 0, 0, language.tag(), cfg)
    };

    resolve_overlaps(&mut slices);
    apply_domain(&mut slices, cfg.domain);

    // Per-span cleanliness: embedded garbage (e.g. a base64 blob region)
    // is dropped with a reason instead of poisoning the vector store.
    let mut dropped = Vec::new();
    if cfg.enforce_clean_text {
        slices.retain(|s| {
            if clean::is_clean_text(s.text.as_bytes()) {
                true
            } else {
                dropped.push(DroppedSpan {
                    start_byte: s.start_byte,
                    end_byte: s.end_byte,
                    reason: String::from("unclean_text"),
                });
                false
            }
        });
    }

    slices.sort_by_key(|s| (s.start_byte, s.end_byte));
    Ok(FileSlices {
        language,
        slices,
        dropped,
    })
}

/// Prose slices adopt the repo's domain family so the router's
/// domain-specific routes (e.g. `medical`) are reachable. Code and config
/// slices keep their content-derived family regardless of domain.
fn apply_domain(slices: &mut [Slice], domain: SliceFamily) {
    match domain {
        SliceFamily::Medical => {
            for s in slices {
                if matches!(s.family, SliceFamily::Docs | SliceFamily::Other) {
                    s.family = SliceFamily::Medical;
                }
            }
        }
        SliceFamily::Docs => {
            for s in slices {
                if s.family == SliceFamily::Other {
                    s.family = SliceFamily::Docs;
                }
            }
        }
        _ => {}
    }
}

/// Overlap tie-break: smaller, syntactically-bounded spans win over
/// windowed ones. Generic slices overlapping any syntactic slice are
/// dropped.
fn resolve_overlaps(slices: &mut Vec<Slice>) {
    let syntactic: Vec<(usize, usize)> = slices
        .iter()
        .filter(|s| s.kind != SliceKind::Generic)
        .map(|s| (s.start_byte, s.end_byte))
        .collect();
    if syntactic.is_empty() {
        return;
    }
    slices.retain(|s| {
        s.kind != SliceKind::Generic
            || !syntactic
                .iter()
                .any(|&(a, b)| s.start_byte < b && a < s.end_byte)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_python_functions_slice_as_functions() {
        let src = b"def alpha():\n    return 1\n\n\ndef beta(x):\n    return x + 1\n";
        let out = slice_file("main.py", src, &SlicerConfig::default()).unwrap();
        let funcs: Vec<_> = out
            .slices
            .iter()
            .filter(|s| s.kind == SliceKind::Function)
            .collect();
        assert_eq!(funcs.len(), 2);
        assert_eq!(out.language, Language::Python);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn markdown_gets_sections() {
        let src = b"# Title\n\nSome body text.\n";
        let out = slice_file("README.md", src, &SlicerConfig::default()).unwrap();
        assert_eq!(out.slices.len(), 1);
        assert_eq!(out.slices[0].kind, SliceKind::Section);
    }

    #[test]
    fn binary_file_is_dropped_with_reason() {
        let src = b"\x00\x01\x02\x03garbage\x00";
        let out = slice_file("blob.bin", src, &SlicerConfig::default()).unwrap();
        assert!(out.slices.is_empty());
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].reason, "unclean_text");
    }

    #[test]
    fn unknown_type_is_windowed() {
        let text: String = (0..200).map(|i| format!("row {i}\n")).collect();
        let out = slice_file("data.csv", text.as_bytes(), &SlicerConfig::default()).unwrap();
        assert!(out.slices.len() > 1);
        assert!(out.slices.iter().all(|s| s.kind == SliceKind::Generic));
    }

    #[test]
    fn reslicing_unchanged_bytes_yields_identical_hashes() {
        let src = b"def alpha():\n    return 1\n";
        let cfg = SlicerConfig::default();
        let a = slice_file("m.py", src, &cfg).unwrap();
        let b = slice_file("m.py", src, &cfg).unwrap();
        let ha: Vec<_> = a.slices.iter().map(|s| s.hash.clone()).collect();
        let hb: Vec<_> = b.slices.iter().map(|s| s.hash.clone()).collect();
        assert_eq!(ha, hb);
    }

    #[test]
    fn medical_domain_retags_prose_but_not_code() {
        let cfg = SlicerConfig {
            domain: SliceFamily::Medical,
            ..SlicerConfig::default()
        };

        let md = slice_file("dosage.md", b"# Dosage\n\nTake twice daily.\n", &cfg).unwrap();
        assert!(!md.slices.is_empty());
        assert!(md.slices.iter().all(|s| s.family == SliceFamily::Medical));

        let py = slice_file("calc.py", b"def dose(kg):\n    return kg * 2\n", &cfg).unwrap();
        assert!(
            py.slices
                .iter()
                .filter(|s| s.kind == SliceKind::Function)
                .all(|s| s.family == SliceFamily::Code),
            "code keeps its content-derived family under any domain"
        );
    }

    #[test]
    fn empty_file_slices_to_nothing() {
        let out = slice_file("empty.py", b"", &SlicerConfig::default()).unwrap();
        assert!(out.slices.is_empty());
        assert!(out.dropped.is_empty());
    }
}
