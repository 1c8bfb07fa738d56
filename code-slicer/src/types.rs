//! Language-agnostic slice schema.
//!
//! A [`Slice`] is one coherent unit of a file: a top-level definition, a
//! heading section, or a fallback window. Byte offsets are the ground
//! truth; line numbers are display hints. Identity is the content-derived
//! [`Slice::hash`], stable across re-indexing as long as the bytes (after
//! normalization), the slice kind, and the sub-language are unchanged.

use serde::{Deserialize, Serialize};

/// Slice taxonomy. Keep it stable: the serialized form lands in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
    /// Function, method, or free-standing callable definition.
    Function,
    /// Class-like container: struct, enum, trait, impl, class, interface.
    Class,
    /// Markup heading with its body.
    Section,
    /// Fallback window or free top-level region.
    Generic,
}

impl SliceKind {
    /// Short stable tag mixed into the span hash.
    pub fn tag(self) -> &'static str {
        match self {
            SliceKind::Function => "function",
            SliceKind::Class => "class",
            SliceKind::Section => "section",
            SliceKind::Generic => "generic",
        }
    }
}

/// Slice family used for routing and pending-work weighting.
///
/// `Medical` is never inferred from file content; prose slices adopt it
/// when the owning repo is registered under the medical domain (see
/// [`SlicerConfig::domain`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceFamily {
    Code,
    Docs,
    Config,
    Medical,
    Other,
}

impl SliceFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            SliceFamily::Code => "code",
            SliceFamily::Docs => "docs",
            SliceFamily::Config => "config",
            SliceFamily::Medical => "medical",
            SliceFamily::Other => "other",
        }
    }
}

/// Source language detected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    Typescript,
    Javascript,
    Markdown,
    Yaml,
    Toml,
    Json,
    Other,
}

impl Language {
    /// Detects the language from a relative path, by extension only.
    pub fn detect(rel_path: &str) -> Self {
        let ext = rel_path
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "ts" | "tsx" => Language::Typescript,
            "js" | "jsx" | "mjs" | "cjs" => Language::Javascript,
            "md" | "markdown" => Language::Markdown,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "json" => Language::Json,
            _ => Language::Other,
        }
    }

    /// Sub-language tag mixed into span hashes and stored on slices.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::Typescript => "typescript",
            Language::Javascript => "javascript",
            Language::Markdown => "markdown",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Json => "json",
            Language::Other => "text",
        }
    }

    /// True when a tree-sitter grammar backs this language.
    pub fn has_grammar(self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::Typescript | Language::Javascript
        )
    }
}

/// One slice of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    /// Content-derived span hash (hex SHA-256).
    pub hash: String,
    /// Absolute byte range in the file.
    pub start_byte: usize,
    pub end_byte: usize,
    /// 0-based line range, end exclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub kind: SliceKind,
    /// Detected sub-language tag (may differ from the file language for
    /// embedded regions).
    pub sub_language: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
    /// Raw slice text (unnormalized; the hash covers the normalized form).
    pub text: String,
    /// Deduped identifiers, definition name first. Feeds lexical ranking
    /// and MMR diversity.
    pub identifiers: Vec<String>,
    /// Routing/weighting family. Starts as the intrinsic classification
    /// from kind and sub-language; prose slices are re-tagged with the
    /// repo's domain family when one is configured. Does not participate
    /// in the span hash.
    pub family: SliceFamily,
}

impl Slice {
    /// Builds a slice over `text` starting at `start_byte`/`start_line`,
    /// computing the end offsets, the span hash, and the intrinsic family.
    pub(crate) fn build(
        text: &str,
        start_byte: usize,
        start_line: usize,
        end_line: usize,
        kind: SliceKind,
        sub_language: &str,
        confidence: f32,
        identifiers: Vec<String>,
    ) -> Self {
        Self {
            hash: crate::hash::span_hash(text, kind.tag(), sub_language),
            start_byte,
            end_byte: start_byte + text.len(),
            start_line,
            end_line,
            kind,
            family: intrinsic_family(kind, sub_language),
            sub_language: sub_language.to_string(),
            confidence,
            text: text.to_string(),
            identifiers,
        }
    }
}

/// Content-derived family classification, before any domain override.
fn intrinsic_family(kind: SliceKind, sub_language: &str) -> SliceFamily {
    match kind {
        SliceKind::Function | SliceKind::Class => SliceFamily::Code,
        SliceKind::Section => SliceFamily::Docs,
        SliceKind::Generic => match sub_language {
            "rust" | "python" | "typescript" | "javascript" => SliceFamily::Code,
            "markdown" => SliceFamily::Docs,
            "yaml" | "toml" | "json" => SliceFamily::Config,
            _ => SliceFamily::Other,
        },
    }
}

/// Why a candidate span was dropped instead of emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedSpan {
    pub start_byte: usize,
    pub end_byte: usize,
    /// Short machine-readable reason (e.g. `unclean_text`).
    pub reason: String,
}

/// Full slicing outcome for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSlices {
    pub language: Language,
    /// Ordered by starting byte.
    pub slices: Vec<Slice>,
    /// Spans rejected by the cleanliness check, with reasons.
    pub dropped: Vec<DroppedSpan>,
}

/// Slicer knobs. Defaults match the documented configuration.
#[derive(Debug, Clone)]
pub struct SlicerConfig {
    /// Markup sections longer than this are split at paragraph breaks.
    pub max_section_lines: usize,
    /// Window height for unknown file types.
    pub window_lines: usize,
    /// Overlap between consecutive windows.
    pub window_overlap: usize,
    /// Files larger than this skip tree-sitter and go straight to windows.
    pub max_parse_bytes: usize,
    /// Drop spans failing the text-cleanliness check.
    pub enforce_clean_text: bool,
    /// Domain family of the repo being sliced. Prose slices (docs/other)
    /// adopt this family so domain-specific routes (e.g. `medical`) can
    /// reach them; code and config stay content-typed.
    pub domain: SliceFamily,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            max_section_lines: 120,
            window_lines: 80,
            window_overlap: 10,
            max_parse_bytes: 2 * 1024 * 1024,
            enforce_clean_text: true,
            domain: SliceFamily::Code,
        }
    }
}
