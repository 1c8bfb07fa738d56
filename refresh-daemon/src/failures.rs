//! Persistent, global failure store (`rag-failures.db`).
//!
//! Pass-level failures per repo, surviving daemon restarts. Span-level
//! failure counters live in each repo's span store; this one answers
//! "which repos have been failing recently" for the health check.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// One recorded pass failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassFailure {
    pub repo_id: String,
    /// Which pass failed (`incremental_sync`, `embed_batch`, ...).
    pub pass: String,
    pub error: String,
    pub at_utc: DateTime<Utc>,
}

/// SQLite-backed failure log.
pub struct FailureStore {
    conn: Mutex<Connection>,
}

impl FailureStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pass_failures (
                 id      INTEGER PRIMARY KEY,
                 repo_id TEXT NOT NULL,
                 pass    TEXT NOT NULL,
                 error   TEXT NOT NULL,
                 at_utc  TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS failures_by_repo
                 ON pass_failures(repo_id, at_utc);",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, repo_id: &str, pass: &str, error: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO pass_failures (repo_id, pass, error, at_utc)
             VALUES (?1, ?2, ?3, ?4)",
            params![repo_id, pass, error, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent failures, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<PassFailure>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT repo_id, pass, error, at_utc FROM pass_failures
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(repo_id, pass, error, at)| PassFailure {
                repo_id,
                pass,
                error,
                at_utc: at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    /// Failure count for one repo (health signal).
    pub fn count_for(&self, repo_id: &str) -> Result<u64> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pass_failures WHERE repo_id = ?1",
            [repo_id],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_lists_newest_first() {
        let store = FailureStore::open_in_memory().unwrap();
        store.record("repo-a", "incremental_sync", "io error").unwrap();
        store.record("repo-a", "enrich_batch", "budget").unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pass, "enrich_batch");
        assert_eq!(store.count_for("repo-a").unwrap(), 2);
        assert_eq!(store.count_for("repo-b").unwrap(), 0);
    }
}
