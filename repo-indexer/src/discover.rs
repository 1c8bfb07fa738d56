//! File discovery honoring VCS ignore rules plus configured globs.
//!
//! Symlinks that resolve outside the repo root are rejected by the path
//! safety layer: logged, skipped, never sliced.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use services::paths;
use tracing::{debug, warn};

use crate::errors::Result;

/// One file eligible for indexing.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Canonical absolute path.
    pub abs_path: PathBuf,
    /// Repo-relative path with forward slashes.
    pub rel_path: String,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
}

/// Generated-file suffixes that never make useful context.
const GENERATED_SUFFIXES: &[&str] = &[".min.js", ".min.css", ".lock", ".g.dart", ".freezed.dart"];

/// Walks `root`, returning indexable files sorted by relative path.
///
/// Honors `.gitignore`/`.ignore` via the walker, skips the `.llmc`
/// workspace, applies `extra_ignores` globs on relative paths, and drops
/// anything whose canonical form escapes the root.
pub fn discover(root: &Path, extra_ignores: &[String]) -> Result<Vec<DiscoveredFile>> {
    let extra = build_globset(extra_ignores);
    let mut out = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file() || t.is_symlink()) {
            continue;
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if rel.starts_with(".llmc/") || rel == ".llmc" {
            continue;
        }
        if GENERATED_SUFFIXES.iter().any(|s| rel.ends_with(s)) {
            continue;
        }
        if let Some(set) = &extra {
            if set.is_match(&rel) {
                continue;
            }
        }

        // Containment check resolves symlinks; an escape is logged and
        // the file never reaches the slicer.
        let abs = match paths::canonicalize_under(root, entry.path()) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "rejected by path safety");
                continue;
            }
        };

        let mtime = std::fs::metadata(&abs)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        out.push(DiscoveredFile {
            abs_path: abs,
            rel_path: rel,
            mtime,
        });
    }

    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    debug!(files = out.len(), root = %root.display(), "discovery complete");
    Ok(out)
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        match Glob::new(p) {
            Ok(g) => {
                builder.add(g);
            }
            Err(e) => warn!(pattern = %p, error = %e, "ignoring bad glob"),
        }
    }
    builder.build().ok()
}
