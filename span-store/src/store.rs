//! The durable span store: files, spans, embeddings, enrichments,
//! routing decisions, failures.
//!
//! Single writer, many readers. The connection is serialized behind a
//! mutex; cross-process exclusion is the caller's job (the repo write
//! lock). Every multi-row mutation runs in one transaction, so a crash at
//! any moment rolls back to the previous consistent state on reopen.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use code_slicer::Slice;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use crate::errors::{Result, StoreError};
use crate::rows::{
    EnrichmentBody, EnrichmentRecord, FailureRecord, FileRecord, RoutingDecision, SpanDiff,
    SpanRecord, StoreCounters, WorkItem,
};
use crate::schema;

/// Weight used for families absent from the configured table.
const DEFAULT_FAMILY_WEIGHT: u32 = 5;

/// Durable index for one repo.
pub struct SpanStore {
    conn: Mutex<Connection>,
    failure_threshold: u32,
    retain_history: bool,
}

impl SpanStore {
    /// Opens (or creates) the store at `db_path`.
    ///
    /// # Errors
    /// [`StoreError::Corruption`] when the integrity check fails or the
    /// schema version does not match; the caller marks the repo unhealthy.
    pub fn open(db_path: &Path, failure_threshold: u32, retain_history: bool) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        schema::init(&conn)?;
        info!(db = %db_path.display(), "span store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            failure_threshold,
            retain_history,
        })
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory(failure_threshold: u32, retain_history: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            failure_threshold,
            retain_history,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Poison only happens if a writer panicked; the transaction it was
        // in has rolled back, so the connection is still consistent.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /* ---------------------------- files ---------------------------- */

    /// Inserts or updates file metadata, returning the file id.
    pub fn upsert_file(
        &self,
        path: &str,
        language: &str,
        mtime: i64,
        content_hash: &str,
        dropped_reason: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO files (path, language, mtime, content_hash, dropped_reason)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                 language = excluded.language,
                 mtime = excluded.mtime,
                 content_hash = excluded.content_hash,
                 dropped_reason = excluded.dropped_reason",
            params![path, language, mtime, content_hash, dropped_reason],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM files WHERE path = ?1",
            [path],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// All file rows, for incremental diffing.
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, language, mtime, content_hash, dropped_reason
             FROM files ORDER BY path",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(FileRecord {
                    id: r.get(0)?,
                    path: r.get(1)?,
                    language: r.get(2)?,
                    mtime: r.get(3)?,
                    content_hash: r.get(4)?,
                    dropped_reason: r.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Removes the file row and all dependent rows.
    pub fn delete_file(&self, file_id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let existing: Vec<String> = collect_hashes(&tx, file_id)?;
        let n = tx.execute("DELETE FROM files WHERE id = ?1", [file_id])?;
        if n == 0 {
            return Err(StoreError::UnknownFile(file_id));
        }
        cascade_orphans(&tx, &existing)?;
        tx.commit()?;
        Ok(())
    }

    /* ---------------------------- spans ---------------------------- */

    /// Diffs `slices` against the file's current spans by span hash.
    ///
    /// Unchanged hashes are preserved (their embedding and enrichment rows
    /// stay put); new hashes are inserted; vanished hashes are removed and
    /// their dependent rows cascade when no other file still carries the
    /// hash. The entire call is one transaction.
    #[instrument(skip(self, slices))]
    pub fn replace_spans(&self, file_id: i64, slices: &[Slice]) -> Result<SpanDiff> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let file_exists: Option<i64> = tx
            .query_row("SELECT id FROM files WHERE id = ?1", [file_id], |r| {
                r.get(0)
            })
            .optional()?;
        if file_exists.is_none() {
            return Err(StoreError::UnknownFile(file_id));
        }

        let existing: HashSet<String> = collect_hashes(&tx, file_id)?.into_iter().collect();

        // Identical content twice in one file collapses to one row.
        let mut new_order: Vec<&Slice> = Vec::new();
        let mut new_set: HashSet<&str> = HashSet::new();
        for s in slices {
            if new_set.insert(s.hash.as_str()) {
                new_order.push(s);
            }
        }

        let removed: Vec<String> = existing
            .iter()
            .filter(|h| !new_set.contains(h.as_str()))
            .cloned()
            .collect();
        for h in &removed {
            tx.execute(
                "DELETE FROM spans WHERE file_id = ?1 AND span_hash = ?2",
                params![file_id, h],
            )?;
        }
        cascade_orphans(&tx, &removed)?;

        let mut added = Vec::new();
        {
            let mut insert = tx.prepare(
                "INSERT INTO spans (file_id, span_hash, kind, family, sub_language,
                                    start_byte, end_byte, start_line, end_line,
                                    confidence, text, identifiers)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for s in &new_order {
                if existing.contains(&s.hash) {
                    continue;
                }
                insert.execute(params![
                    file_id,
                    s.hash,
                    s.kind.tag(),
                    s.family.as_str(),
                    s.sub_language,
                    s.start_byte as i64,
                    s.end_byte as i64,
                    s.start_line as i64,
                    s.end_line as i64,
                    s.confidence as f64,
                    s.text,
                    serde_json::to_string(&s.identifiers)?,
                ])?;
                added.push(s.hash.clone());
            }
        }

        let kept = new_order.len() - added.len();
        tx.commit()?;

        debug!(
            file_id,
            added = added.len(),
            kept,
            removed = removed.len(),
            "spans replaced"
        );
        Ok(SpanDiff {
            added,
            kept,
            removed: removed.len(),
        })
    }

    /// Span row by hash (any owning file; first by path order).
    pub fn span_by_hash(&self, span_hash: &str) -> Result<Option<SpanRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT s.id, s.file_id, f.path, s.span_hash, s.kind, s.family,
                        s.sub_language, s.start_line, s.end_line, s.text, s.identifiers
                 FROM spans s JOIN files f ON f.id = s.file_id
                 WHERE s.span_hash = ?1 ORDER BY f.path LIMIT 1",
                [span_hash],
                map_span_record,
            )
            .optional()?;
        Ok(row)
    }

    /// Every span row. The ranker builds its lexical pool from this.
    pub fn all_spans(&self) -> Result<Vec<SpanRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.file_id, f.path, s.span_hash, s.kind, s.family,
                    s.sub_language, s.start_line, s.end_line, s.text, s.identifiers
             FROM spans s JOIN files f ON f.id = s.file_id
             ORDER BY f.path, s.start_byte",
        )?;
        let rows = stmt
            .query_map([], map_span_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /* -------------------------- embeddings -------------------------- */

    /// Writes or replaces the embedding for a span.
    ///
    /// # Errors
    /// [`StoreError::UnknownSpan`] when the hash is absent.
    pub fn write_embedding(&self, span_hash: &str, model_id: &str, vector: &[f32]) -> Result<()> {
        let conn = self.lock();
        ensure_span(&conn, span_hash)?;
        conn.execute(
            "INSERT INTO embeddings (span_hash, model_id, dim, vector)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(span_hash) DO UPDATE SET
                 model_id = excluded.model_id,
                 dim = excluded.dim,
                 vector = excluded.vector",
            params![
                span_hash,
                model_id,
                vector.len() as i64,
                schema::vector_to_blob(vector)
            ],
        )?;
        Ok(())
    }

    /// Embedding vector for one span, if present under the active model.
    pub fn embedding_of(&self, span_hash: &str, model_id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE span_hash = ?1 AND model_id = ?2",
                params![span_hash, model_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| schema::blob_to_vector(&b)))
    }

    /// All `(span_hash, vector)` pairs for the active model. Feeds the
    /// ranker's cosine scan.
    pub fn all_embeddings(&self, model_id: &str) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT span_hash, vector FROM embeddings WHERE model_id = ?1")?;
        let rows = stmt
            .query_map([model_id], |r| {
                let hash: String = r.get(0)?;
                let blob: Vec<u8> = r.get(1)?;
                Ok((hash, schema::blob_to_vector(&blob)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Spans with no embedding under `model_id`: either never embedded or
    /// embedded with a previous model (those rows are stale by definition).
    pub fn spans_missing_embedding(&self, model_id: &str, limit: usize) -> Result<Vec<WorkItem>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.span_hash, f.path, s.kind, s.family, s.sub_language, s.text, s.identifiers
             FROM spans s JOIN files f ON f.id = s.file_id
             WHERE NOT EXISTS (
                 SELECT 1 FROM embeddings e
                 WHERE e.span_hash = s.span_hash AND e.model_id = ?1
             )
             GROUP BY s.span_hash
             ORDER BY MIN(s.id) ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![model_id, limit as i64], map_work_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /* ------------------------- enrichments ------------------------- */

    /// Writes the current enrichment for a span, replacing (or, with
    /// history retention on, superseding) the previous row.
    pub fn write_enrichment(
        &self,
        span_hash: &str,
        body: &EnrichmentBody,
        chain: &str,
        tier: u8,
        provider: &str,
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        ensure_span(&tx, span_hash)?;
        if self.retain_history {
            tx.execute(
                "UPDATE enrichments SET current = 0 WHERE span_hash = ?1 AND current = 1",
                [span_hash],
            )?;
        } else {
            tx.execute("DELETE FROM enrichments WHERE span_hash = ?1", [span_hash])?;
        }
        tx.execute(
            "INSERT INTO enrichments (span_hash, current, summary, inputs, outputs,
                                      pitfalls, tags, chain, tier, provider, model, completed_utc)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                span_hash,
                body.summary,
                serde_json::to_string(&body.inputs)?,
                serde_json::to_string(&body.outputs)?,
                serde_json::to_string(&body.pitfalls)?,
                serde_json::to_string(&body.tags)?,
                chain,
                tier as i64,
                provider,
                model,
                at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Current enrichment row for a span.
    pub fn current_enrichment(&self, span_hash: &str) -> Result<Option<EnrichmentRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT span_hash, summary, inputs, outputs, pitfalls, tags,
                        chain, tier, provider, model, completed_utc
                 FROM enrichments WHERE span_hash = ?1 AND current = 1",
                [span_hash],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, String>(6)?,
                        r.get::<_, i64>(7)?,
                        r.get::<_, String>(8)?,
                        r.get::<_, String>(9)?,
                        r.get::<_, String>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((hash, summary, inputs, outputs, pitfalls, tags, chain, tier, provider, model, at)) =
            row
        else {
            return Ok(None);
        };
        Ok(Some(EnrichmentRecord {
            span_hash: hash,
            body: EnrichmentBody {
                summary,
                inputs: serde_json::from_str(&inputs)?,
                outputs: serde_json::from_str(&outputs)?,
                pitfalls: serde_json::from_str(&pitfalls)?,
                tags: serde_json::from_str(&tags)?,
            },
            chain,
            tier: tier as u8,
            provider,
            model,
            completed_utc: at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /* ----------------------- routing decisions ----------------------- */

    /// Appends a routing decision. Never mutates existing rows.
    pub fn write_routing_decision(&self, d: &RoutingDecision) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO routing_decisions
                 (span_hash, slice_kind, chain, outcome, total_duration_ms,
                  input_tokens, output_tokens, estimated_cost_usd, attempts, decided_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                d.span_hash,
                d.slice_kind,
                d.chain,
                d.outcome,
                d.total_duration_ms as i64,
                d.input_tokens as i64,
                d.output_tokens as i64,
                d.estimated_cost_usd,
                serde_json::to_string(&d.attempts)?,
                d.decided_utc.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Decisions for one span, in issue order.
    pub fn decisions_for(&self, span_hash: &str) -> Result<Vec<RoutingDecision>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT span_hash, slice_kind, chain, outcome, total_duration_ms,
                    input_tokens, output_tokens, estimated_cost_usd, attempts, decided_utc
             FROM routing_decisions WHERE span_hash = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([span_hash], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, i64>(6)?,
                    r.get::<_, f64>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, String>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (hash, kind, chain, outcome, dur, inp, outp, cost, attempts, at) in rows {
            out.push(RoutingDecision {
                span_hash: hash,
                slice_kind: kind,
                chain,
                outcome,
                total_duration_ms: dur as u64,
                input_tokens: inp as u64,
                output_tokens: outp as u64,
                estimated_cost_usd: cost,
                attempts: serde_json::from_str(&attempts)?,
                decided_utc: at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(out)
    }

    /* --------------------------- failures --------------------------- */

    /// Increments the failure counter, returning the new count.
    pub fn record_failure(&self, span_hash: &str, chain: &str, reason: &str) -> Result<u32> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO failures (span_hash, chain, reason, count, last_seen_utc)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(span_hash) DO UPDATE SET
                 chain = excluded.chain,
                 reason = excluded.reason,
                 count = failures.count + 1,
                 last_seen_utc = excluded.last_seen_utc",
            params![span_hash, chain, reason, Utc::now().to_rfc3339()],
        )?;
        let count: u32 = conn.query_row(
            "SELECT count FROM failures WHERE span_hash = ?1",
            [span_hash],
            |r| r.get(0),
        )?;
        if count >= self.failure_threshold {
            info!(span_hash, count, "span poisoned");
        }
        Ok(count)
    }

    /// True once the failure count reached the poisoning threshold.
    pub fn is_poisoned(&self, span_hash: &str) -> Result<bool> {
        let conn = self.lock();
        let count: Option<u32> = conn
            .query_row(
                "SELECT count FROM failures WHERE span_hash = ?1",
                [span_hash],
                |r| r.get(0),
            )
            .optional()?;
        Ok(count.is_some_and(|c| c >= self.failure_threshold))
    }

    /// Operator reset: clears the failure record for one span, or all of
    /// them when `span_hash` is `None`.
    pub fn reset_failures(&self, span_hash: Option<&str>) -> Result<usize> {
        let conn = self.lock();
        let n = match span_hash {
            Some(h) => conn.execute("DELETE FROM failures WHERE span_hash = ?1", [h])?,
            None => conn.execute("DELETE FROM failures", [])?,
        };
        Ok(n)
    }

    /// Failure rows, most recent first (for health reporting).
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<FailureRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT span_hash, chain, reason, count, last_seen_utc
             FROM failures ORDER BY last_seen_utc DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, u32>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(span_hash, chain, reason, count, at)| FailureRecord {
                span_hash,
                chain,
                reason,
                count,
                last_seen_utc: at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    /* ------------------------- pending work ------------------------- */

    /// Returns up to `limit` spans lacking a current enrichment, excluding
    /// poisoned spans and files touched within the cooldown.
    ///
    /// The batch is NOT insertion-ordered: candidates are bucketed by
    /// family and drawn by inverse weight (lower weight = drawn first and
    /// more often), so a burst of low-priority files cannot starve
    /// high-priority content. Within a bucket, order is file mtime
    /// descending, then insertion order.
    #[instrument(skip(self, weights, now))]
    pub fn pending_enrichments(
        &self,
        limit: usize,
        cooldown_seconds: u64,
        weights: &BTreeMap<String, u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        let cutoff = now.timestamp() - cooldown_seconds as i64;
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.span_hash, f.path, s.kind, s.family, s.sub_language, s.text, s.identifiers
             FROM spans s JOIN files f ON f.id = s.file_id
             WHERE NOT EXISTS (
                 SELECT 1 FROM enrichments e
                 WHERE e.span_hash = s.span_hash AND e.current = 1
             )
             AND NOT EXISTS (
                 SELECT 1 FROM failures p
                 WHERE p.span_hash = s.span_hash AND p.count >= ?1
             )
             AND f.mtime <= ?2
             GROUP BY s.span_hash
             ORDER BY MAX(f.mtime) DESC, MIN(s.id) ASC",
        )?;
        let candidates = stmt
            .query_map(params![self.failure_threshold, cutoff], map_work_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        Ok(weighted_mix(candidates, limit, weights))
    }

    /// Consistency scan: deletes embedding/enrichment/failure rows whose
    /// span hash no longer exists. Scheduled by the orchestrator after a
    /// referential inconsistency surfaces.
    pub fn integrity_sweep(&self) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0usize;
        for table in ["embeddings", "enrichments", "failures"] {
            removed += tx.execute(
                &format!(
                    "DELETE FROM {table} WHERE span_hash NOT IN (SELECT span_hash FROM spans)"
                ),
                [],
            )?;
        }
        tx.commit()?;
        if removed > 0 {
            info!(removed, "integrity sweep removed orphan rows");
        }
        Ok(removed)
    }

    /// Number of spans still lacking a current enrichment (ignores
    /// cooldown; includes poisoned spans in `poisoned`, not here).
    pub fn counters(&self) -> Result<StoreCounters> {
        let conn = self.lock();
        let one = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |r| r.get::<_, i64>(0))? as u64)
        };
        Ok(StoreCounters {
            files_total: one("SELECT COUNT(*) FROM files")?,
            spans_total: one("SELECT COUNT(DISTINCT span_hash) FROM spans")?,
            embeddings_total: one("SELECT COUNT(*) FROM embeddings")?,
            enrichments_total: one(
                "SELECT COUNT(*) FROM enrichments WHERE current = 1",
            )?,
            pending: conn.query_row(
                "SELECT COUNT(DISTINCT s.span_hash) FROM spans s
                 WHERE NOT EXISTS (
                     SELECT 1 FROM enrichments e
                     WHERE e.span_hash = s.span_hash AND e.current = 1
                 )
                 AND NOT EXISTS (
                     SELECT 1 FROM failures p
                     WHERE p.span_hash = s.span_hash AND p.count >= ?1
                 )",
                [self.failure_threshold],
                |r| r.get::<_, i64>(0),
            )? as u64,
            poisoned: conn.query_row(
                "SELECT COUNT(*) FROM failures WHERE count >= ?1",
                [self.failure_threshold],
                |r| r.get::<_, i64>(0),
            )? as u64,
        })
    }
}

/* ----------------------------- helpers ----------------------------- */

fn ensure_span(conn: &Connection, span_hash: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM spans WHERE span_hash = ?1 LIMIT 1",
            [span_hash],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(StoreError::UnknownSpan(span_hash.to_string()));
    }
    Ok(())
}

fn collect_hashes(conn: &Connection, file_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT span_hash FROM spans WHERE file_id = ?1")?;
    let rows = stmt
        .query_map([file_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes embedding/enrichment/failure rows for hashes that no longer
/// exist under any file. Runs inside the caller's transaction.
fn cascade_orphans(conn: &Connection, hashes: &[String]) -> Result<()> {
    for h in hashes {
        let still_there: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM spans WHERE span_hash = ?1 LIMIT 1",
                [h],
                |r| r.get(0),
            )
            .optional()?;
        if still_there.is_none() {
            conn.execute("DELETE FROM embeddings WHERE span_hash = ?1", [h])?;
            conn.execute("DELETE FROM enrichments WHERE span_hash = ?1", [h])?;
            conn.execute("DELETE FROM failures WHERE span_hash = ?1", [h])?;
        }
    }
    Ok(())
}

fn map_span_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<SpanRecord> {
    let identifiers: String = r.get(10)?;
    Ok(SpanRecord {
        id: r.get(0)?,
        file_id: r.get(1)?,
        path: r.get(2)?,
        span_hash: r.get(3)?,
        kind: r.get(4)?,
        family: r.get(5)?,
        sub_language: r.get(6)?,
        start_line: r.get::<_, i64>(7)? as usize,
        end_line: r.get::<_, i64>(8)? as usize,
        text: r.get(9)?,
        identifiers: serde_json::from_str(&identifiers).unwrap_or_default(),
    })
}

fn map_work_item(r: &rusqlite::Row<'_>) -> rusqlite::Result<WorkItem> {
    let identifiers: String = r.get(6)?;
    Ok(WorkItem {
        span_hash: r.get(0)?,
        path: r.get(1)?,
        kind: r.get(2)?,
        family: r.get(3)?,
        sub_language: r.get(4)?,
        text: r.get(5)?,
        identifiers: serde_json::from_str(&identifiers).unwrap_or_default(),
    })
}

/// Draws a mixed batch across family buckets by inverse weight.
///
/// Weight semantics follow the configured table: weight 1 content is drawn
/// seven times as often as weight 7 content. Whenever candidates exist in
/// several buckets, the batch contains entries from each.
fn weighted_mix(
    candidates: Vec<WorkItem>,
    limit: usize,
    weights: &BTreeMap<String, u32>,
) -> Vec<WorkItem> {
    if candidates.len() <= limit {
        return candidates;
    }

    // Bucket in arrival order (already mtime/insertion ranked).
    let mut buckets: Vec<(String, Vec<WorkItem>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in candidates {
        let key = item.family.clone();
        let i = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push((key.clone(), Vec::new()));
            buckets.len() - 1
        });
        buckets[i].1.push(item);
    }

    let weight_of = |family: &str| -> u32 {
        weights.get(family).copied().unwrap_or(DEFAULT_FAMILY_WEIGHT).max(1)
    };

    // Priority order: lower weight first.
    buckets.sort_by_key(|(family, _)| weight_of(family));

    // Quotas proportional to inverse weight over non-empty buckets.
    let inv_sum: f64 = buckets
        .iter()
        .map(|(family, _)| 1.0 / weight_of(family) as f64)
        .sum();
    let mut out: Vec<WorkItem> = Vec::with_capacity(limit);
    let mut cursors: Vec<usize> = vec![0; buckets.len()];

    for (i, (family, items)) in buckets.iter().enumerate() {
        let share = (1.0 / weight_of(family) as f64) / inv_sum;
        let quota = ((limit as f64) * share).ceil() as usize;
        let take = quota.min(items.len()).min(limit - out.len());
        out.extend(items[..take].iter().cloned());
        cursors[i] = take;
        if out.len() >= limit {
            break;
        }
    }

    // Fill any remainder in priority order.
    'outer: for (i, (_, items)) in buckets.iter().enumerate() {
        while cursors[i] < items.len() {
            if out.len() >= limit {
                break 'outer;
            }
            out.push(items[cursors[i]].clone());
            cursors[i] += 1;
        }
    }

    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_items(family: &str, n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem {
                span_hash: format!("{family}-{i}"),
                path: format!("{family}/{i}"),
                kind: String::from("generic"),
                family: family.to_string(),
                sub_language: String::new(),
                text: String::new(),
                identifiers: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn weighted_mix_prefers_low_weight_buckets() {
        let mut candidates = mk_items("docs", 30);
        candidates.extend(mk_items("code", 8));
        let mut weights = BTreeMap::new();
        weights.insert(String::from("code"), 1);
        weights.insert(String::from("docs"), 7);

        let batch = weighted_mix(candidates, 10, &weights);
        assert_eq!(batch.len(), 10);
        let code = batch.iter().filter(|w| w.family == "code").count();
        let docs = batch.iter().filter(|w| w.family == "docs").count();
        assert!(code >= 5, "code-first weighting must dominate, got {code}");
        assert!(docs >= 1, "non-empty buckets must all be represented");
    }

    #[test]
    fn weighted_mix_passes_small_sets_through() {
        let candidates = mk_items("docs", 3);
        let batch = weighted_mix(candidates, 10, &BTreeMap::new());
        assert_eq!(batch.len(), 3);
    }
}
