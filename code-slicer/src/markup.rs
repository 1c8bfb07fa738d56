//! Markdown section slicing.
//!
//! One slice per heading with its body, bounded to a configurable line
//! count; oversized sections split at paragraph boundaries. Heading
//! detection goes through `pulldown-cmark`'s offset iterator, which keeps
//! `#` inside fenced code blocks from being mistaken for structure.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};

use crate::types::{Slice, SliceKind, SlicerConfig};

const SECTION_CONFIDENCE: f32 = 0.8;

/// Slices a markdown document into heading sections.
pub fn section_slices(text: &str, cfg: &SlicerConfig) -> Vec<Slice> {
    let heading_starts = heading_offsets(text);

    // Section boundaries: document start, then every heading start.
    let mut bounds: Vec<usize> = Vec::with_capacity(heading_starts.len() + 2);
    bounds.push(0);
    for (off, _) in &heading_starts {
        if *off != 0 {
            bounds.push(*off);
        }
    }
    bounds.push(text.len());
    bounds.dedup();

    let line_starts = line_start_offsets(text);
    let mut out = Vec::new();

    for pair in bounds.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let body = &text[start..end];
        if body.trim().is_empty() {
            continue;
        }
        let start_line = line_of(&line_starts, start);
        for part in split_long_section(body, start, start_line, cfg) {
            out.push(part);
        }
    }
    out
}

/// Byte offsets (and levels) of every heading in source order.
fn heading_offsets(text: &str) -> Vec<(usize, HeadingLevel)> {
    let parser = Parser::new_ext(text, Options::empty());
    let mut out = Vec::new();
    for (event, range) in parser.into_offset_iter() {
        if let Event::Start(Tag::Heading { level, .. }) = event {
            out.push((range.start, level));
        }
    }
    out.sort_by_key(|(off, _)| *off);
    out
}

/// Splits an oversized section at blank-line paragraph boundaries.
fn split_long_section(
    body: &str,
    base_byte: usize,
    base_line: usize,
    cfg: &SlicerConfig,
) -> Vec<Slice> {
    let title = section_title(body);
    let line_count = body.lines().count();
    if line_count <= cfg.max_section_lines {
        return vec![make_section(body, base_byte, base_line, title)];
    }

    let mut out = Vec::new();
    let lines: Vec<&str> = body.split_inclusive('\n').collect();
    let mut chunk_start = 0usize; // line index
    let mut cursor = 0usize;

    while chunk_start < lines.len() {
        let hard_end = (chunk_start + cfg.max_section_lines).min(lines.len());
        // Walk back from the hard limit to the nearest paragraph break.
        let mut end = hard_end;
        if hard_end < lines.len() {
            for i in (chunk_start + 1..hard_end).rev() {
                if lines[i].trim().is_empty() {
                    end = i;
                    break;
                }
            }
        }

        let part: String = lines[chunk_start..end].iter().copied().collect();
        let part_bytes = part.len();
        if !part.trim().is_empty() {
            out.push(make_section(
                &part,
                base_byte + cursor,
                base_line + chunk_start,
                title.clone(),
            ));
        }
        cursor += part_bytes;
        chunk_start = end.max(chunk_start + 1);
    }
    out
}

fn make_section(body: &str, start_byte: usize, start_line: usize, title: Option<String>) -> Slice {
    let end_line = start_line + body.lines().count();
    let identifiers = title.into_iter().collect();
    Slice::build(
        body,
        start_byte,
        start_line,
        end_line,
        SliceKind::Section,
        "markdown",
        SECTION_CONFIDENCE,
        identifiers,
    )
}

/// First ATX heading text of the section, used as its identifier.
fn section_title(body: &str) -> Option<String> {
    let first = body.lines().find(|l| !l.trim().is_empty())?;
    let trimmed = first.trim_start();
    let stripped = trimmed.trim_start_matches('#');
    if stripped.len() != trimmed.len() && !stripped.trim().is_empty() {
        Some(stripped.trim().to_string())
    } else {
        None
    }
}

fn line_start_offsets(text: &str) -> Vec<usize> {
    let mut out = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            out.push(i + 1);
        }
    }
    out
}

fn line_of(line_starts: &[usize], byte: usize) -> usize {
    match line_starts.binary_search(&byte) {
        Ok(i) => i,
        Err(i) => i.saturating_sub(1),
    }
}
