//! SQLite schema and connection setup.
//!
//! Span identity is the content-derived span hash. The same hash may
//! legitimately appear under two files (copied content), so spans are
//! unique per `(file_id, span_hash)` and the embedding/enrichment tables
//! key on the hash alone; cascade happens manually inside the owning
//! transaction when a hash disappears from its last file.

use rusqlite::Connection;

use crate::errors::{Result, StoreError};

/// Bumped on breaking schema changes; mismatches refuse to open.
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY,
    path          TEXT NOT NULL UNIQUE,
    language      TEXT NOT NULL,
    mtime         INTEGER NOT NULL,
    content_hash  TEXT NOT NULL,
    dropped_reason TEXT
);

CREATE TABLE IF NOT EXISTS spans (
    id            INTEGER PRIMARY KEY,
    file_id       INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    span_hash     TEXT NOT NULL,
    kind          TEXT NOT NULL,
    family        TEXT NOT NULL,
    sub_language  TEXT NOT NULL,
    start_byte    INTEGER NOT NULL,
    end_byte      INTEGER NOT NULL,
    start_line    INTEGER NOT NULL,
    end_line      INTEGER NOT NULL,
    confidence    REAL NOT NULL,
    text          TEXT NOT NULL,
    identifiers   TEXT NOT NULL,
    UNIQUE (file_id, span_hash)
);
CREATE INDEX IF NOT EXISTS spans_by_hash ON spans(span_hash);

CREATE TABLE IF NOT EXISTS embeddings (
    span_hash     TEXT PRIMARY KEY,
    model_id      TEXT NOT NULL,
    dim           INTEGER NOT NULL,
    vector        BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS enrichments (
    id            INTEGER PRIMARY KEY,
    span_hash     TEXT NOT NULL,
    current       INTEGER NOT NULL DEFAULT 1,
    summary       TEXT NOT NULL,
    inputs        TEXT NOT NULL,
    outputs       TEXT NOT NULL,
    pitfalls      TEXT NOT NULL,
    tags          TEXT NOT NULL,
    chain         TEXT NOT NULL,
    tier          INTEGER NOT NULL,
    provider      TEXT NOT NULL,
    model         TEXT NOT NULL,
    completed_utc TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS enrichments_current
    ON enrichments(span_hash) WHERE current = 1;

CREATE TABLE IF NOT EXISTS routing_decisions (
    id                 INTEGER PRIMARY KEY,
    span_hash          TEXT NOT NULL,
    slice_kind         TEXT NOT NULL,
    chain              TEXT NOT NULL,
    outcome            TEXT NOT NULL,
    total_duration_ms  INTEGER NOT NULL,
    input_tokens       INTEGER NOT NULL,
    output_tokens      INTEGER NOT NULL,
    estimated_cost_usd REAL NOT NULL,
    attempts           TEXT NOT NULL,
    decided_utc        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS decisions_by_hash ON routing_decisions(span_hash);

CREATE TABLE IF NOT EXISTS failures (
    span_hash     TEXT PRIMARY KEY,
    chain         TEXT NOT NULL,
    reason        TEXT NOT NULL,
    count         INTEGER NOT NULL,
    last_seen_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key           TEXT PRIMARY KEY,
    value         TEXT NOT NULL
);
";

/// Applies pragmas and creates the schema on a fresh connection.
///
/// A quick integrity check runs first so corruption surfaces as
/// [`StoreError::Corruption`] at open time, not mid-commit.
pub fn init(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let ok: String = conn.query_row("PRAGMA quick_check", [], |r| r.get(0))?;
    if ok != "ok" {
        return Err(StoreError::Corruption(ok));
    }

    conn.execute_batch(SCHEMA)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(StoreError::Corruption(format!(
                "schema version mismatch: store has {v}, binary expects {SCHEMA_VERSION}"
            )));
        }
    }
    Ok(())
}

/// Little-endian f32 serialization for embedding vectors.
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
