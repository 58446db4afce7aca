//! Graph traversal queries.
//!
//! "Who calls X up to depth D" is answered by one recursive CTE per request,
//! never by per-node lookups in the caller (the N+1 shape cannot meet the
//! latency budget). Cycles fall out of the `UNION` dedup plus the depth cap;
//! `GROUP BY fqn` with `MIN(depth)` keeps the shortest depth per caller.

use rusqlite::types::Value;

use minerva_model::{AntiPatternRecord, Severity, SymbolKind, SymbolRecord};

use crate::error::Result;
use crate::store::{symbol_from_row, GraphStore};

/// Hard cap on rows a single traversal can return.
pub const TRAVERSAL_LIMIT: usize = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub struct TraversalHit {
    pub fqn: String,
    pub depth: u32,
    pub kind: SymbolKind,
    pub name: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageHit {
    pub hit: TraversalHit,
    pub is_test: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub target_fqn: String,
    pub hits: Vec<CoverageHit>,
    pub test_caller_count: usize,
    pub non_test_caller_count: usize,
}

impl CoverageReport {
    pub fn covered(&self) -> bool {
        self.test_caller_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Follow `calls` edges backwards: who reaches the target.
    Reverse,
    /// Follow `calls` edges forwards: what the target reaches.
    Forward,
}

impl GraphStore {
    /// Transitive callers of `fqn`, shortest depth per caller, bounded by
    /// `depth` and [`TRAVERSAL_LIMIT`].
    pub fn impact(&self, fqn: &str, depth: u32) -> Result<Vec<TraversalHit>> {
        self.traverse(fqn, depth, Direction::Reverse)
    }

    /// Transitive callees of `fqn`.
    pub fn call_chain(&self, fqn: &str, depth: u32) -> Result<Vec<TraversalHit>> {
        self.traverse(fqn, depth, Direction::Forward)
    }

    fn traverse(&self, fqn: &str, depth: u32, direction: Direction) -> Result<Vec<TraversalHit>> {
        let (select_col, join_col) = match direction {
            Direction::Reverse => ("from_fqn", "to_fqn"),
            Direction::Forward => ("to_fqn", "from_fqn"),
        };
        let sql = format!(
            "WITH RECURSIVE walk(fqn, depth) AS ( \
                 SELECT e.{select_col}, 0 FROM edges e \
                 WHERE e.{join_col} = ?1 AND e.relation = 'calls' \
                 UNION \
                 SELECT e.{select_col}, w.depth + 1 \
                 FROM edges e JOIN walk w ON e.{join_col} = w.fqn \
                 WHERE e.relation = 'calls' AND w.depth + 1 < ?2 \
             ) \
             SELECT w.fqn, MIN(w.depth) AS depth, s.kind, s.name, s.file_path \
             FROM walk w JOIN symbols s ON s.fqn = w.fqn \
             GROUP BY w.fqn \
             ORDER BY depth, w.fqn \
             LIMIT ?3"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![fqn, depth, TRAVERSAL_LIMIT as i64],
                traversal_hit_from_row,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    /// Reverse traversal with each caller classified test/non-test in the
    /// same query. `test_patterns` are SQL LIKE patterns over `file_path`;
    /// the heuristic is the caller's policy, nothing is hard-coded here.
    pub fn coverage(
        &self,
        fqn: &str,
        depth: u32,
        test_patterns: &[String],
    ) -> Result<CoverageReport> {
        let test_clause = if test_patterns.is_empty() {
            "0".to_string()
        } else {
            let likes: Vec<&str> = test_patterns.iter().map(|_| "s.file_path LIKE ?").collect();
            format!("({})", likes.join(" OR "))
        };
        let sql = format!(
            "WITH RECURSIVE walk(fqn, depth) AS ( \
                 SELECT e.from_fqn, 0 FROM edges e \
                 WHERE e.to_fqn = ?1 AND e.relation = 'calls' \
                 UNION \
                 SELECT e.from_fqn, w.depth + 1 \
                 FROM edges e JOIN walk w ON e.to_fqn = w.fqn \
                 WHERE e.relation = 'calls' AND w.depth + 1 < ?2 \
             ) \
             SELECT w.fqn, MIN(w.depth) AS depth, s.kind, s.name, s.file_path, \
                    {test_clause} AS is_test \
             FROM walk w JOIN symbols s ON s.fqn = w.fqn \
             GROUP BY w.fqn \
             ORDER BY depth, w.fqn \
             LIMIT {TRAVERSAL_LIMIT}"
        );

        let mut params: Vec<Value> = vec![Value::from(fqn.to_string()), Value::from(depth as i64)];
        for pattern in test_patterns {
            params.push(Value::from(pattern.clone()));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                Ok(CoverageHit {
                    hit: traversal_hit_from_row(row)?,
                    is_test: row.get::<_, bool>(5)?,
                })
            })?;
            let hits = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            let test_caller_count = hits.iter().filter(|h| h.is_test).count();
            let non_test_caller_count = hits.len() - test_caller_count;
            Ok(CoverageReport {
                target_fqn: fqn.to_string(),
                hits,
                test_caller_count,
                non_test_caller_count,
            })
        })
    }

    /// The test symbols (direct or transitive callers matching the test
    /// patterns) that exercise `fqn`.
    pub fn test_mapping(
        &self,
        fqn: &str,
        depth: u32,
        test_patterns: &[String],
    ) -> Result<Vec<TraversalHit>> {
        let report = self.coverage(fqn, depth, test_patterns)?;
        Ok(report
            .hits
            .into_iter()
            .filter(|h| h.is_test)
            .map(|h| h.hit)
            .collect())
    }

    /// Substring lookup over symbol names and FQNs, for the query facade's
    /// non-semantic fallback.
    pub fn find_symbols_like(&self, needle: &str, limit: usize) -> Result<Vec<SymbolRecord>> {
        let pattern = format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_"));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT fqn, kind, name, file_path, line_number, modifiers, signature, \
                        parent_fqn, annotations, attributes \
                 FROM symbols \
                 WHERE name LIKE ?1 ESCAPE '\\' OR fqn LIKE ?1 ESCAPE '\\' \
                 ORDER BY fqn LIMIT ?2",
            )?;
            let rows =
                stmt.query_map(rusqlite::params![pattern, limit as i64], symbol_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    /// Resolve a summary vector id back to its target symbol, for semantic
    /// search result mapping.
    pub fn summary_target_for_vector(&self, vector_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            use rusqlite::OptionalExtension;
            conn.prepare_cached("SELECT target_fqn FROM summaries WHERE vector_id = ?1")?
                .query_row([vector_id], |row| row.get(0))
                .optional()
                .map_err(Into::into)
        })
    }

    /// Targets whose summaries are flagged stale.
    pub fn stale_summary_targets(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT target_fqn FROM summaries WHERE is_stale = 1 ORDER BY target_fqn",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    /// `calls` edges whose endpoints coincide (direct self-recursion).
    pub fn self_call_edges(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT from_fqn FROM edges \
                 WHERE relation = 'calls' AND from_fqn = to_fqn ORDER BY from_fqn",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    /// `calls` edges where both endpoints are registered entry points.
    pub fn entry_point_call_edges(&self) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT e.from_fqn, e.to_fqn FROM edges e \
                 WHERE e.relation = 'calls' \
                   AND EXISTS(SELECT 1 FROM entry_points p WHERE p.symbol_fqn = e.from_fqn) \
                   AND EXISTS(SELECT 1 FROM entry_points p WHERE p.symbol_fqn = e.to_fqn) \
                 ORDER BY e.from_fqn, e.to_fqn",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    // ------------------------------------------------------------------
    // Anti-patterns
    // ------------------------------------------------------------------

    pub fn insert_anti_patterns(&self, records: &[AntiPatternRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.with_tx(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO anti_patterns \
                     (rule_id, from_fqn, to_fqn, severity, message, detected_at) \
                 SELECT ?1, ?2, (SELECT s.fqn FROM symbols s WHERE s.fqn = ?3), ?4, ?5, ?6 \
                 WHERE EXISTS(SELECT 1 FROM symbols WHERE fqn = ?2)",
            )?;
            let mut written = 0usize;
            for record in records {
                written += stmt.execute(rusqlite::params![
                    record.rule_id,
                    record.from_fqn,
                    record.to_fqn,
                    record.severity.as_str(),
                    record.message,
                    record.detected_at,
                ])?;
            }
            Ok(written)
        })
    }

    pub fn list_anti_patterns(&self) -> Result<Vec<AntiPatternRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT rule_id, from_fqn, to_fqn, severity, message, detected_at \
                 FROM anti_patterns ORDER BY detected_at, rule_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let severity: String = row.get(3)?;
                Ok(AntiPatternRecord {
                    rule_id: row.get(0)?,
                    from_fqn: row.get(1)?,
                    to_fqn: row.get(2)?,
                    severity: Severity::parse(&severity).unwrap_or(Severity::Warning),
                    message: row.get(4)?,
                    detected_at: row.get(5)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }
}

fn traversal_hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TraversalHit> {
    let kind: String = row.get(2)?;
    Ok(TraversalHit {
        fqn: row.get(0)?,
        depth: row.get(1)?,
        kind: SymbolKind::parse(&kind).unwrap_or(SymbolKind::Method),
        name: row.get(3)?,
        file_path: row.get(4)?,
    })
}
