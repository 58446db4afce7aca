use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use minerva_model::{
    now_millis, AttrMap, EdgeRecord, EdgeRelation, EntryPointKind, EntryPointRecord, SymbolKind,
    SymbolRecord,
};
use minerva_vector::VectorStore;

use crate::connection::{
    drop_thread_connections, in_transaction, next_instance_id, open_configured,
    with_thread_connection,
};
use crate::error::{Result, StoreError};
use crate::schema::run_migrations;
use crate::swap::{recover_incomplete_swap, SwapRecovery};

/// SQLite parameter budget headroom: default `SQLITE_MAX_VARIABLE_NUMBER`
/// is 999 on older builds.
pub(crate) const IN_CLAUSE_CHUNK: usize = 500;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EdgeInsertReport {
    pub written: usize,
    /// Edges dropped because an endpoint is not an indexed symbol (calls into
    /// the JDK and other external code).
    pub skipped_missing_endpoint: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrphanReport {
    /// vector_ids referenced by relational rows but absent from the vector
    /// store.
    pub missing_vectors: Vec<String>,
    /// Vector-store ids no relational row references.
    pub dangling_vectors: Vec<String>,
}

/// The relational half of the dual store, plus the binding that keeps the
/// vector half consistent with it.
pub struct GraphStore {
    path: PathBuf,
    instance_id: u64,
    generation: AtomicU64,
    vector_store: Option<Arc<dyn VectorStore>>,
    pub(crate) last_recovery: SwapRecovery,
}

impl Drop for GraphStore {
    fn drop(&mut self) {
        // Release this thread's cached connections so the database file (and
        // its WAL) closes promptly. Other threads release theirs when they
        // exit.
        drop_thread_connections(self.instance_id);
    }
}

impl GraphStore {
    /// Open the store: run swap recovery, apply pending migrations, and (when
    /// a vector store is attached) reconcile orphaned vectors.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_inner(path.into(), None)
    }

    pub fn open_with_vector_store(
        path: impl Into<PathBuf>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Self::open_inner(path.into(), Some(vector_store))
    }

    fn open_inner(path: PathBuf, vector_store: Option<Arc<dyn VectorStore>>) -> Result<Self> {
        let last_recovery = recover_incomplete_swap(&path)?;
        let conn = open_configured(&path)?;
        run_migrations(&conn)?;
        drop(conn);

        let store = Self {
            path,
            instance_id: next_instance_id(),
            generation: AtomicU64::new(0),
            vector_store,
            last_recovery,
        };
        if store.vector_store.is_some() {
            let reconciled = store.reconcile_vectors(crate::dual_write::RECONCILE_GRACE)?;
            if reconciled > 0 {
                tracing::info!(
                    target = "minerva.store",
                    reconciled,
                    "reconciled pending vectors on open"
                );
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn vector_store(&self) -> Option<&Arc<dyn VectorStore>> {
        self.vector_store.as_ref()
    }

    /// What swap recovery found when this store was opened.
    pub fn swap_recovery(&self) -> &SwapRecovery {
        &self.last_recovery
    }

    /// Invalidate every thread's cached connection. Called after the database
    /// file is atomically replaced underneath us.
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let generation = self.generation.load(Ordering::SeqCst);
        with_thread_connection(self.instance_id, generation, &self.path, f)
    }

    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| in_transaction(conn, f))
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    /// Bulk conflict-on-unique-key upsert.
    ///
    /// Never delete-and-insert: a delete would cascade onto dependent
    /// summaries and entry points. `kind` is intentionally not in the update
    /// set; an attempted kind change is an integrity error.
    pub fn upsert_symbols(&self, symbols: &[SymbolRecord]) -> Result<usize> {
        if symbols.is_empty() {
            return Ok(0);
        }

        // Types first so parent references resolve within one batch.
        let mut ordered: Vec<&SymbolRecord> = symbols.iter().collect();
        ordered.sort_by_key(|s| !s.is_type());

        self.with_tx(|conn| {
            {
                let mut kind_check =
                    conn.prepare_cached("SELECT kind FROM symbols WHERE fqn = ?1")?;
                for symbol in &ordered {
                    let existing: Option<String> = kind_check
                        .query_row([&symbol.fqn], |row| row.get(0))
                        .optional()?;
                    if let Some(existing) = existing {
                        if existing != symbol.kind.as_str() {
                            return Err(StoreError::KindTransition {
                                fqn: symbol.fqn.clone(),
                                existing,
                                attempted: symbol.kind.as_str().to_string(),
                            });
                        }
                    }
                }
            }

            let mut stmt = conn.prepare_cached(
                "INSERT INTO symbols \
                     (fqn, kind, name, file_path, line_number, modifiers, signature, parent_fqn, annotations, attributes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, (SELECT s.fqn FROM symbols s WHERE s.fqn = ?8), ?9, ?10) \
                 ON CONFLICT(fqn) DO UPDATE SET \
                     name = excluded.name, \
                     file_path = excluded.file_path, \
                     line_number = excluded.line_number, \
                     modifiers = excluded.modifiers, \
                     signature = excluded.signature, \
                     parent_fqn = excluded.parent_fqn, \
                     annotations = excluded.annotations, \
                     attributes = excluded.attributes",
            )?;
            let mut written = 0usize;
            for symbol in &ordered {
                written += stmt.execute(params![
                    symbol.fqn,
                    symbol.kind.as_str(),
                    symbol.name,
                    symbol.file_path,
                    symbol.line_number,
                    serde_json::to_string(&symbol.modifiers).unwrap_or_else(|_| "[]".into()),
                    symbol.signature,
                    symbol.parent_fqn,
                    serde_json::to_string(&symbol.annotations).unwrap_or_else(|_| "[]".into()),
                    symbol.attributes.to_json(),
                ])?;
            }
            Ok(written)
        })
    }

    pub fn get_symbol(&self, fqn: &str) -> Result<Option<SymbolRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "SELECT fqn, kind, name, file_path, line_number, modifiers, signature, \
                        parent_fqn, annotations, attributes \
                 FROM symbols WHERE fqn = ?1",
            )?
            .query_row([fqn], symbol_from_row)
            .optional()
            .map_err(Into::into)
        })
    }

    /// FQNs of symbols whose `file_path` is one of `paths`.
    pub fn symbols_in_files(&self, paths: &[String]) -> Result<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut out = Vec::new();
            for chunk in paths.chunks(IN_CLAUSE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql =
                    format!("SELECT fqn FROM symbols WHERE file_path IN ({placeholders})");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
            Ok(out)
        })
    }

    /// Delete a symbol and everything hanging off it (members via
    /// `parent_fqn`, edges, summaries, entry points). Relational rows go
    /// first; vector deletions follow and leave tombstones on failure.
    pub fn delete_symbol(&self, fqn: &str) -> Result<bool> {
        let vector_ids: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "WITH RECURSIVE sub(fqn) AS ( \
                     SELECT ?1 \
                     UNION \
                     SELECT s.fqn FROM symbols s JOIN sub ON s.parent_fqn = sub.fqn \
                 ) \
                 SELECT vector_id FROM summaries \
                 WHERE target_fqn IN (SELECT fqn FROM sub) AND vector_id IS NOT NULL",
            )?;
            let rows = stmt.query_map([fqn], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })?;

        let deleted =
            self.with_tx(|conn| Ok(conn.execute("DELETE FROM symbols WHERE fqn = ?1", [fqn])?))?;
        if deleted == 0 {
            return Ok(false);
        }

        for vector_id in vector_ids {
            self.delete_vector_with_tombstone(&vector_id, fqn)?;
        }
        Ok(true)
    }

    /// True when `PRAGMA foreign_key_check` reports no rows.
    pub fn foreign_keys_consistent(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
            let mut rows = stmt.query([])?;
            Ok(rows.next()?.is_none())
        })
    }

    /// Checkpoint and truncate the WAL so the main database file is
    /// self-contained (required before the file is moved aside).
    pub fn checkpoint(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_row| Ok(()))?;
            Ok(())
        })
    }

    pub fn symbol_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?)
        })
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Batched edge upsert with endpoint-existence guards. Edges whose
    /// endpoints are not indexed symbols are counted, not errors: calls into
    /// external code are expected.
    pub fn insert_edges(&self, edges: &[EdgeRecord]) -> Result<EdgeInsertReport> {
        if edges.is_empty() {
            return Ok(EdgeInsertReport::default());
        }
        self.with_tx(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO edges (from_fqn, to_fqn, relation, kind, metadata) \
                 SELECT ?1, ?2, ?3, ?4, ?5 \
                 WHERE EXISTS(SELECT 1 FROM symbols WHERE fqn = ?1) \
                   AND EXISTS(SELECT 1 FROM symbols WHERE fqn = ?2) \
                 ON CONFLICT(from_fqn, to_fqn, relation, kind) \
                 DO UPDATE SET metadata = excluded.metadata",
            )?;
            let mut report = EdgeInsertReport::default();
            for edge in edges {
                let written = stmt.execute(params![
                    edge.from_fqn,
                    edge.to_fqn,
                    edge.relation.as_str(),
                    edge.kind,
                    edge.metadata.to_json(),
                ])?;
                if written == 0 {
                    report.skipped_missing_endpoint += 1;
                } else {
                    report.written += written;
                }
            }
            Ok(report)
        })
    }

    pub fn edges_from(&self, fqn: &str) -> Result<Vec<EdgeRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT from_fqn, to_fqn, relation, kind, metadata FROM edges WHERE from_fqn = ?1",
            )?;
            let rows = stmt.query_map([fqn], edge_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    pub fn edge_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?)
        })
    }

    /// Edges with a missing endpoint. With foreign keys enforced this should
    /// always be zero; the rebuild integrity suite checks it anyway.
    pub fn orphan_edge_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE \
                     NOT EXISTS(SELECT 1 FROM symbols s WHERE s.fqn = edges.from_fqn) \
                     OR NOT EXISTS(SELECT 1 FROM symbols s WHERE s.fqn = edges.to_fqn)",
                [],
                |row| row.get(0),
            )?)
        })
    }

    /// Distinct direct callers of any of `fqns` (1-hop dependents).
    pub fn callers_of(&self, fqns: &[String]) -> Result<Vec<String>> {
        if fqns.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut out = Vec::new();
            for chunk in fqns.chunks(IN_CLAUSE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "SELECT DISTINCT from_fqn FROM edges \
                     WHERE relation = 'calls' AND to_fqn IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
            out.sort();
            out.dedup();
            Ok(out)
        })
    }

    /// Distinct non-null parents of `fqns`.
    pub fn parents_of(&self, fqns: &[String]) -> Result<Vec<String>> {
        if fqns.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut out = Vec::new();
            for chunk in fqns.chunks(IN_CLAUSE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "SELECT DISTINCT parent_fqn FROM symbols \
                     WHERE fqn IN ({placeholders}) AND parent_fqn IS NOT NULL"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
            out.sort();
            out.dedup();
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Staleness
    // ------------------------------------------------------------------

    /// Mark every summary of the given targets stale, atomically, and return
    /// the true affected-row count. One IN-clause update per chunk inside a
    /// single transaction; per-fqn update loops are forbidden (wrong counts,
    /// O(n) commits).
    pub fn mark_stale(&self, fqns: &[String]) -> Result<usize> {
        if fqns.is_empty() {
            return Ok(0);
        }
        let now = now_millis();
        self.with_tx(|conn| {
            let mut affected = 0usize;
            for chunk in fqns.chunks(IN_CLAUSE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "UPDATE summaries SET is_stale = 1, updated_at = {now} \
                     WHERE target_fqn IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                affected += stmt.execute(rusqlite::params_from_iter(chunk))?;
            }
            Ok(affected)
        })
    }

    pub fn stale_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM summaries WHERE is_stale = 1",
                [],
                |row| row.get(0),
            )?)
        })
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Same upsert discipline as symbols: conflict-on-unique-key UPDATE.
    pub fn upsert_entry_points(&self, entry_points: &[EntryPointRecord]) -> Result<usize> {
        if entry_points.is_empty() {
            return Ok(0);
        }
        self.with_tx(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO entry_points \
                     (symbol_fqn, entry_type, http_method, http_path, cron_expression, mq_queue) \
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6 \
                 WHERE EXISTS(SELECT 1 FROM symbols WHERE fqn = ?1) \
                 ON CONFLICT(symbol_fqn) DO UPDATE SET \
                     entry_type = excluded.entry_type, \
                     http_method = excluded.http_method, \
                     http_path = excluded.http_path, \
                     cron_expression = excluded.cron_expression, \
                     mq_queue = excluded.mq_queue",
            )?;
            let mut written = 0usize;
            for ep in entry_points {
                written += stmt.execute(params![
                    ep.symbol_fqn,
                    ep.entry_type.as_str(),
                    ep.http_method,
                    ep.http_path,
                    ep.cron_expression,
                    ep.mq_queue,
                ])?;
            }
            Ok(written)
        })
    }

    pub fn list_entry_points(
        &self,
        filter: Option<EntryPointKind>,
    ) -> Result<Vec<EntryPointRecord>> {
        self.with_conn(|conn| {
            let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<EntryPointRecord> {
                let entry_type: String = row.get(1)?;
                Ok(EntryPointRecord {
                    symbol_fqn: row.get(0)?,
                    entry_type: EntryPointKind::parse(&entry_type)
                        .unwrap_or(EntryPointKind::JobInterface),
                    http_method: row.get(2)?,
                    http_path: row.get(3)?,
                    cron_expression: row.get(4)?,
                    mq_queue: row.get(5)?,
                })
            };
            let mut out = Vec::new();
            match filter {
                Some(kind) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT symbol_fqn, entry_type, http_method, http_path, cron_expression, mq_queue \
                         FROM entry_points WHERE entry_type = ?1 ORDER BY symbol_fqn",
                    )?;
                    let rows = stmt.query_map([kind.as_str()], map)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT symbol_fqn, entry_type, http_method, http_path, cron_expression, mq_queue \
                         FROM entry_points ORDER BY symbol_fqn",
                    )?;
                    let rows = stmt.query_map([], map)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Indexed file hashes (incremental change detection)
    // ------------------------------------------------------------------

    pub fn record_indexed_files(&self, hashes: &[(String, String)]) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let now = now_millis();
        self.with_tx(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO indexed_files (file_path, content_hash, indexed_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(file_path) DO UPDATE SET \
                     content_hash = excluded.content_hash, \
                     indexed_at = excluded.indexed_at",
            )?;
            for (path, hash) in hashes {
                stmt.execute(params![path, hash, now])?;
            }
            Ok(())
        })
    }

    pub fn forget_indexed_files(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.with_tx(|conn| {
            for chunk in paths.chunks(IN_CLAUSE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql =
                    format!("DELETE FROM indexed_files WHERE file_path IN ({placeholders})");
                let mut stmt = conn.prepare(&sql)?;
                stmt.execute(rusqlite::params_from_iter(chunk))?;
            }
            Ok(())
        })
    }

    pub fn indexed_file_hashes(&self) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT file_path, content_hash FROM indexed_files")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    // ------------------------------------------------------------------
    // Orphan detection
    // ------------------------------------------------------------------

    /// Compare vector ids referenced by relational rows against the vector
    /// store's contents.
    pub fn detect_orphans(&self) -> Result<OrphanReport> {
        let Some(vector_store) = &self.vector_store else {
            return Ok(OrphanReport::default());
        };

        let referenced: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT vector_id FROM summaries WHERE vector_id IS NOT NULL \
                 UNION SELECT vector_id FROM glossary WHERE vector_id IS NOT NULL \
                 UNION SELECT vector_id FROM constraints WHERE vector_id IS NOT NULL",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })?;

        let mut report = OrphanReport::default();
        for vector_id in &referenced {
            if !vector_store.contains(vector_id)? {
                report.missing_vectors.push(vector_id.clone());
            }
        }
        let referenced_set: std::collections::HashSet<&String> = referenced.iter().collect();
        for id in vector_store.ids()? {
            if !referenced_set.contains(&id) {
                report.dangling_vectors.push(id);
            }
        }
        report.missing_vectors.sort();
        report.dangling_vectors.sort();
        Ok(report)
    }
}

pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

pub(crate) fn symbol_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord> {
    let kind: String = row.get(1)?;
    let modifiers: String = row.get(5)?;
    let annotations: String = row.get(8)?;
    let attributes: String = row.get(9)?;
    Ok(SymbolRecord {
        fqn: row.get(0)?,
        kind: SymbolKind::parse(&kind).unwrap_or(SymbolKind::Class),
        name: row.get(2)?,
        file_path: row.get(3)?,
        line_number: row.get(4)?,
        modifiers: serde_json::from_str(&modifiers).unwrap_or_default(),
        signature: row.get(6)?,
        parent_fqn: row.get(7)?,
        annotations: serde_json::from_str(&annotations).unwrap_or_default(),
        attributes: AttrMap::from_json(&attributes),
    })
}

pub(crate) fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRecord> {
    let relation: String = row.get(2)?;
    let metadata: String = row.get(4)?;
    Ok(EdgeRecord {
        from_fqn: row.get(0)?,
        to_fqn: row.get(1)?,
        relation: EdgeRelation::parse(&relation).unwrap_or(EdgeRelation::Calls),
        kind: row.get(3)?,
        metadata: AttrMap::from_json(&metadata),
    })
}
