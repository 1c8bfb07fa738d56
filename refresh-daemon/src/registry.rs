//! Repo registry: `repos.yml` under the global LLMC directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::errors::{DaemonError, Result};

/// Domain tag of a registered repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoDomain {
    Code,
    Docs,
    Medical,
    Other,
}

impl Default for RepoDomain {
    fn default() -> Self {
        RepoDomain::Code
    }
}

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    pub id: String,
    /// Canonical filesystem root.
    pub root: PathBuf,
    #[serde(default)]
    pub domain: RepoDomain,
    pub registered_utc: DateTime<Utc>,
}

/// YAML-backed registry of repos under management.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// Registry at an explicit path (tests); production uses
    /// `~/.llmc/repos.yml` via [`Registry::default_location`].
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Self {
        Self {
            path: services::global_dir().join("repos.yml"),
        }
    }

    /// All registered repos. An absent file is an empty registry.
    pub fn list(&self) -> Result<Vec<RepoEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_yml::from_str(&raw)?)
    }

    /// Registers a repo root (canonicalized). Re-registering the same
    /// root is idempotent and returns the existing entry.
    pub fn register(&self, root: &Path, domain: RepoDomain) -> Result<RepoEntry> {
        let canonical = std::fs::canonicalize(root)?;
        let mut entries = self.list()?;
        if let Some(existing) = entries.iter().find(|e| e.root == canonical) {
            return Ok(existing.clone());
        }

        let entry = RepoEntry {
            id: repo_id(&canonical),
            root: canonical,
            domain,
            registered_utc: Utc::now(),
        };
        entries.push(entry.clone());
        self.save(&entries)?;
        info!(id = %entry.id, root = %entry.root.display(), "repo registered");
        Ok(entry)
    }

    /// Unregisters by id.
    pub fn unregister(&self, id: &str) -> Result<()> {
        let mut entries = self.list()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(DaemonError::UnknownRepo(id.to_string()));
        }
        self.save(&entries)?;
        info!(id, "repo unregistered");
        Ok(())
    }

    fn save(&self, entries: &[RepoEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("yml.tmp");
        std::fs::write(&tmp, serde_yml::to_string(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Stable repo id: directory name plus a short digest of the canonical
/// root, unique even for same-named directories.
fn repo_id(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase().replace(' ', "-"))
        .unwrap_or_else(|| String::from("repo"));
    let mut h = Sha256::new();
    h.update(root.to_string_lossy().as_bytes());
    let digest = format!("{:x}", h.finalize());
    format!("{name}-{}", &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_list_unregister_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("proj");
        std::fs::create_dir(&repo).unwrap();
        let registry = Registry::at(dir.path().join("repos.yml"));

        let entry = registry.register(&repo, RepoDomain::Code).unwrap();
        assert!(entry.id.starts_with("proj-"));

        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, entry.id);

        // Idempotent re-register.
        let again = registry.register(&repo, RepoDomain::Docs).unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(registry.list().unwrap().len(), 1);

        registry.unregister(&entry.id).unwrap();
        assert!(registry.list().unwrap().is_empty());
        assert!(matches!(
            registry.unregister(&entry.id),
            Err(DaemonError::UnknownRepo(_))
        ));
    }
}
