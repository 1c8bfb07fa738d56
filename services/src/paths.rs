//! Path canonicalization and workspace containment.
//!
//! Every path that crosses a crate boundary in the RAG core goes through
//! [`canonicalize_under`] first. The canonical form, not the raw user
//! input, is what gets persisted, logged, or compared. Containment is
//! checked at segment granularity, so `/a/b` is never treated as a prefix
//! of `/a/bb`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenient result alias for path operations.
pub type Result<T> = std::result::Result<T, PathError>;

/// Errors raised while resolving or validating paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// The resolved path leaves the allowed root, or targets a
    /// device/socket/FIFO instead of a regular file or directory.
    #[error("path escapes workspace root {root}: {path}")]
    Escape {
        /// Allowed root the path was checked against.
        root: PathBuf,
        /// Fully resolved offender.
        path: PathBuf,
    },

    /// The path (or one of its components) does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// Underlying filesystem error during resolution.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves `user_path` against `root` and verifies containment.
///
/// Resolution follows `.`/`..` and every symlink component to a real,
/// absolute path. Relative inputs are joined onto `root` before
/// resolution. The returned path is the canonical form; callers must not
/// keep the original string around.
///
/// # Errors
/// - [`PathError::NotFound`] if the target does not exist.
/// - [`PathError::Escape`] if the canonical result is outside `root`, or
///   the target is not a regular file or directory.
pub fn canonicalize_under(root: &Path, user_path: &Path) -> Result<PathBuf> {
    let joined = if user_path.is_absolute() {
        user_path.to_path_buf()
    } else {
        root.join(user_path)
    };

    let canonical = fs::canonicalize(&joined).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PathError::NotFound(joined.clone())
        } else {
            PathError::Io {
                path: joined.clone(),
                source: e,
            }
        }
    })?;

    let canonical_root = fs::canonicalize(root).map_err(|e| PathError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    if !is_inside(&canonical_root, &canonical) {
        return Err(PathError::Escape {
            root: canonical_root,
            path: canonical,
        });
    }

    let meta = fs::symlink_metadata(&canonical).map_err(|e| PathError::Io {
        path: canonical.clone(),
        source: e,
    })?;
    if !meta.file_type().is_file() && !meta.file_type().is_dir() {
        // Devices, sockets and FIFOs are never indexable content.
        return Err(PathError::Escape {
            root: canonical_root,
            path: canonical,
        });
    }

    Ok(canonical)
}

/// Segment-granularity containment check.
///
/// Both arguments are expected to be canonical already. Comparison happens
/// per path component, so `/a/bb` is not inside `/a/b`.
pub fn is_inside(root: &Path, abs_path: &Path) -> bool {
    abs_path.starts_with(root)
}

/// Per-repo workspace directory (`<root>/.llmc`).
pub fn workspace_dir(root: &Path) -> PathBuf {
    root.join(".llmc")
}

/// Global LLMC directory (`~/.llmc`), holding the registry and the shared
/// failure store. Falls back to the current directory when no home
/// directory can be resolved (e.g. bare containers).
pub fn global_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".llmc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn x() {}\n").unwrap();

        let p = canonicalize_under(root, Path::new("src/lib.rs")).unwrap();
        assert!(p.ends_with("src/lib.rs"));
        assert!(p.is_absolute());
    }

    #[test]
    fn rejects_dotdot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir(&root).unwrap();
        fs::write(dir.path().join("outside.txt"), "x").unwrap();

        let err = canonicalize_under(&root, Path::new("../outside.txt")).unwrap_err();
        assert!(matches!(err, PathError::Escape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir(&root).unwrap();
        fs::write(dir.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();

        let err = canonicalize_under(&root, Path::new("link.txt")).unwrap_err();
        assert!(matches!(err, PathError::Escape { .. }));
    }

    #[test]
    fn prefix_check_is_segment_granular() {
        assert!(is_inside(Path::new("/a/b"), Path::new("/a/b/c.rs")));
        assert!(!is_inside(Path::new("/a/b"), Path::new("/a/bb/c.rs")));
    }

    #[test]
    fn missing_target_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = canonicalize_under(dir.path(), Path::new("nope.rs")).unwrap_err();
        assert!(matches!(err, PathError::NotFound(_)));
    }
}
