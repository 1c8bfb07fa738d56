//! Tree-sitter slicing for supported code languages.
//!
//! A single DFS-free walker over top-level nodes (no `Query` API, so it
//! stays version-agnostic across grammars): one slice per top-level
//! definition, one per method inside a class-like container, one per
//! contiguous free region between definitions. Regions containing syntax
//! errors degrade to generic windows instead of aborting the file.

mod javascript;
mod python;
mod rust;
mod typescript;

use tree_sitter::{Node, Parser};

use crate::errors::{Error, Result};
use crate::types::{Language, Slice, SliceKind, SlicerConfig};
use crate::windows::window_slices;

/// Confidence for cleanly parsed definitions.
const DEF_CONFIDENCE: f32 = 0.9;
/// Confidence for methods lifted out of a container body.
const METHOD_CONFIDENCE: f32 = 0.85;
/// Confidence for free top-level regions.
const FREE_CONFIDENCE: f32 = 0.5;
/// Confidence for module docstrings.
const DOCSTRING_CONFIDENCE: f32 = 0.8;
/// Cap on identifiers collected per slice.
const MAX_IDENTIFIERS: usize = 64;

/// Static grammar description for one language.
pub(crate) struct LanguageSpec {
    pub grammar: tree_sitter::Language,
    /// Top-level node kinds emitted as [`SliceKind::Function`].
    pub function_kinds: &'static [&'static str],
    /// Top-level node kinds emitted as [`SliceKind::Class`].
    pub class_kinds: &'static [&'static str],
    /// Node kinds that wrap a real definition (decorators, exports);
    /// the walker looks through them at the first def-like named child.
    pub wrapper_kinds: &'static [&'static str],
    /// Node kinds counted as identifiers when collecting.
    pub identifier_kinds: &'static [&'static str],
    /// Whether a leading string expression is a module docstring.
    pub module_docstring: bool,
}

fn spec_for(lang: Language) -> Option<LanguageSpec> {
    match lang {
        Language::Rust => Some(rust::spec()),
        Language::Python => Some(python::spec()),
        Language::Typescript => Some(typescript::spec()),
        Language::Javascript => Some(javascript::spec()),
        _ => None,
    }
}

/// Slices a code file. Falls back to `Err` only when the grammar cannot
/// be loaded or the parser produces no tree at all; the router turns that
/// into generic windows.
pub fn code_slices(text: &str, lang: Language, cfg: &SlicerConfig) -> Result<Vec<Slice>> {
    let spec = spec_for(lang)
        .ok_or_else(|| Error::TreeSitterLanguage(format!("no grammar for {:?}", lang)))?;

    let mut parser = Parser::new();
    parser
        .set_language(&spec.grammar)
        .map_err(|e| Error::TreeSitterLanguage(e.to_string()))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| Error::TreeSitterLanguage("parser returned no tree".into()))?;

    let root = tree.root_node();
    let sub = lang.tag();
    let mut out: Vec<Slice> = Vec::new();

    // Free-region accumulator: byte offset where the current run started,
    // or None while inside definitions.
    let mut free_start: Option<usize> = None;
    let mut saw_docstring = false;

    let flush_free = |out: &mut Vec<Slice>, from: Option<usize>, to: usize| {
        let Some(start) = from else { return };
        if to <= start {
            return;
        }
        let body = &text[start..to];
        if body.trim().is_empty() {
            return;
        }
        let start_line = line_at(text, start);
        emit_free_region(out, body, start, start_line, sub, cfg);
    };

    let mut cursor = root.walk();
    for (idx, child) in root.named_children(&mut cursor).enumerate() {
        // Python-style module docstring: first statement, bare string.
        if spec.module_docstring && idx == 0 && !saw_docstring && is_docstring(child) {
            saw_docstring = true;
            let body = &text[child.byte_range()];
            out.push(Slice::build(
                body,
                child.start_byte(),
                child.start_position().row,
                child.end_position().row + 1,
                SliceKind::Section,
                sub,
                DOCSTRING_CONFIDENCE,
                Vec::new(),
            ));
            continue;
        }

        let resolved = resolve_wrapper(child, &spec);
        let kind = classify(resolved, &spec);

        match kind {
            Some(slice_kind) if !resolved.has_error() => {
                flush_free(&mut out, free_start.take(), child.start_byte());
                emit_definition(&mut out, text, child, resolved, slice_kind, &spec, sub);
            }
            _ if child.is_error() || child.has_error() => {
                // Degrade the broken region to windows; neighbors survive.
                flush_free(&mut out, free_start.take(), child.start_byte());
                let body = &text[child.byte_range()];
                out.extend(window_slices(
                    body,
                    child.start_byte(),
                    child.start_position().row,
                    sub,
                    cfg,
                ));
            }
            _ => {
                // Part of a free region.
                if free_start.is_none() {
                    free_start = Some(child.start_byte());
                }
                continue;
            }
        }
    }
    flush_free(&mut out, free_start.take(), text.len());

    out.sort_by_key(|s| (s.start_byte, s.end_byte));
    Ok(out)
}

/// Looks through decorator/export wrappers at the inner definition.
fn resolve_wrapper<'t>(node: Node<'t>, spec: &LanguageSpec) -> Node<'t> {
    if !spec.wrapper_kinds.contains(&node.kind()) {
        return node;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if spec.function_kinds.contains(&child.kind()) || spec.class_kinds.contains(&child.kind())
        {
            return child;
        }
    }
    node
}

fn classify(node: Node<'_>, spec: &LanguageSpec) -> Option<SliceKind> {
    if spec.function_kinds.contains(&node.kind()) {
        Some(SliceKind::Function)
    } else if spec.class_kinds.contains(&node.kind()) {
        Some(SliceKind::Class)
    } else {
        None
    }
}

/// Emits the definition slice; class-like containers additionally emit one
/// slice per method found in their body.
fn emit_definition(
    out: &mut Vec<Slice>,
    text: &str,
    outer: Node<'_>,
    resolved: Node<'_>,
    kind: SliceKind,
    spec: &LanguageSpec,
    sub: &str,
) {
    // The outer node keeps decorators/export keywords in the span.
    let body = &text[outer.byte_range()];
    let identifiers = collect_identifiers(resolved, text, spec);
    out.push(Slice::build(
        body,
        outer.start_byte(),
        outer.start_position().row,
        outer.end_position().row + 1,
        kind,
        sub,
        DEF_CONFIDENCE,
        identifiers,
    ));

    if kind != SliceKind::Class {
        return;
    }

    // Methods ride along as their own Function slices.
    let mut stack = vec![resolved];
    while let Some(n) = stack.pop() {
        let mut cursor = n.walk();
        for child in n.named_children(&mut cursor) {
            if spec.function_kinds.contains(&child.kind()) {
                if child.has_error() {
                    continue;
                }
                let method_body = &text[child.byte_range()];
                let identifiers = collect_identifiers(child, text, spec);
                out.push(Slice::build(
                    method_body,
                    child.start_byte(),
                    child.start_position().row,
                    child.end_position().row + 1,
                    SliceKind::Function,
                    sub,
                    METHOD_CONFIDENCE,
                    identifiers,
                ));
            } else if !spec.class_kinds.contains(&child.kind()) {
                // Do not descend into nested containers; they would
                // double-emit their own methods.
                stack.push(child);
            }
        }
    }
}

fn emit_free_region(
    out: &mut Vec<Slice>,
    body: &str,
    start_byte: usize,
    start_line: usize,
    sub: &str,
    cfg: &SlicerConfig,
) {
    let line_count = body.lines().count();
    if line_count > cfg.window_lines * 2 {
        // Very long free regions (data tables, generated constants) are
        // windowed rather than embedded as one giant span.
        out.extend(window_slices(body, start_byte, start_line, sub, cfg));
        return;
    }
    out.push(Slice::build(
        body,
        start_byte,
        start_line,
        start_line + line_count,
        SliceKind::Generic,
        sub,
        FREE_CONFIDENCE,
        Vec::new(),
    ));
}

/// Collects deduped identifiers from the definition subtree, definition
/// name first, capped at [`MAX_IDENTIFIERS`].
fn collect_identifiers(node: Node<'_>, text: &str, spec: &LanguageSpec) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let bytes = text.as_bytes();

    if let Some(name) = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .and_then(|n| n.utf8_text(bytes).ok())
    {
        out.push(name.to_string());
    }

    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if out.len() >= MAX_IDENTIFIERS {
            break;
        }
        let mut cursor = n.walk();
        for child in n.named_children(&mut cursor) {
            if spec.identifier_kinds.contains(&child.kind()) {
                if let Ok(ident) = child.utf8_text(bytes) {
                    if is_ident_like(ident) && !out.iter().any(|x| x == ident) {
                        out.push(ident.to_string());
                        if out.len() >= MAX_IDENTIFIERS {
                            break;
                        }
                    }
                }
            } else {
                stack.push(child);
            }
        }
    }
    out
}

/// A bare string expression in statement position.
fn is_docstring(node: Node<'_>) -> bool {
    node.kind() == "expression_statement"
        && node.named_child(0).is_some_and(|c| c.kind() == "string")
}

fn is_ident_like(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
        && s.chars().next().is_some_and(|c| !c.is_ascii_digit())
}

/// 0-based line number of `byte` in `text`.
fn line_at(text: &str, byte: usize) -> usize {
    text.as_bytes()[..byte].iter().filter(|&&b| b == b'\n').count()
}
