//! Two-phase dual-writes binding the relational and vector stores.
//!
//! Protocol for any row that carries an embedding:
//! 1. write the embedding under a fresh `vector_id`;
//! 2. in one relational transaction, upsert the row with that `vector_id`;
//! 3. if step 2 fails, best-effort delete the vector, and if that delete
//!    also fails, record the orphan in `pending_vectors` through a separate
//!    connection (the failed transaction's connection is no longer usable
//!    for tracking, and dropping the record silently would leak the vector).
//!
//! Deletes run the other way: relational row first, vector second, tombstone
//! on vector failure. A reconciler retries tombstoned deletions after a
//! grace window.

use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use minerva_model::{
    now_millis, ConstraintRecord, GlossaryRecord, PendingVectorRecord, Severity, SummaryLevel,
    SummaryRecord,
};

use crate::connection::open_configured;
use crate::error::{Result, StoreError};
use crate::store::GraphStore;

/// Tombstones younger than this are left alone by the reconciler; the
/// in-flight write that created them may still be compensating.
pub(crate) const RECONCILE_GRACE: Duration = Duration::from_secs(60);

pub(crate) const REASON_ROLLBACK_FAILED: &str = "rollback_failed";
pub(crate) const REASON_DELETE_FAILED: &str = "delete_failed";

/// One summary write request.
#[derive(Debug, Clone)]
pub struct SummaryWrite {
    pub target_fqn: String,
    pub level: SummaryLevel,
    pub summary: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryWriteOutcome {
    Written { vector_id: Option<String> },
    /// The conditional write found `is_stale` already cleared by another
    /// writer and did nothing.
    SkippedNotStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    AllOrNothing,
    BestEffort,
}

#[derive(Debug, Default)]
pub struct BatchSummaryReport {
    pub written: usize,
    pub failed: Vec<(String, String)>,
}

impl GraphStore {
    /// Unconditional dual-write of one summary.
    pub fn create_summary_with_vector(&self, write: &SummaryWrite) -> Result<SummaryWriteOutcome> {
        self.summary_write_inner(write, false)
    }

    /// Dual-write that re-checks the stale flag inside the transaction and
    /// skips when another writer already cleared it. Last-writer-wins is not
    /// acceptable for stale transitions.
    pub fn write_summary_if_stale(&self, write: &SummaryWrite) -> Result<SummaryWriteOutcome> {
        self.summary_write_inner(write, true)
    }

    fn summary_write_inner(
        &self,
        write: &SummaryWrite,
        only_if_stale: bool,
    ) -> Result<SummaryWriteOutcome> {
        let vector_id = self.add_vector_phase(
            write.embedding.as_deref(),
            &write.target_fqn,
            write.level.as_str(),
        )?;

        let now = now_millis();
        let tx_result: Result<Option<Option<String>>> = self.with_tx(|conn| {
            if only_if_stale {
                let stale: Option<bool> = conn
                    .prepare_cached(
                        "SELECT is_stale FROM summaries WHERE target_fqn = ?1 AND level = ?2",
                    )?
                    .query_row(params![write.target_fqn, write.level.as_str()], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if stale == Some(false) {
                    return Ok(None);
                }
            }

            let previous: Option<Option<String>> = conn
                .prepare_cached(
                    "SELECT vector_id FROM summaries WHERE target_fqn = ?1 AND level = ?2",
                )?
                .query_row(params![write.target_fqn, write.level.as_str()], |row| {
                    row.get(0)
                })
                .optional()?;

            conn.prepare_cached(
                "INSERT INTO summaries \
                     (target_fqn, level, summary, vector_id, is_stale, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5) \
                 ON CONFLICT(target_fqn, level) DO UPDATE SET \
                     summary = excluded.summary, \
                     vector_id = excluded.vector_id, \
                     is_stale = 0, \
                     updated_at = excluded.updated_at",
            )?
            .execute(params![
                write.target_fqn,
                write.level.as_str(),
                write.summary,
                vector_id,
                now,
            ])?;

            Ok(Some(previous.flatten()))
        });

        match tx_result {
            Ok(Some(previous_vector)) => {
                // Replaced rows leave their old vector behind; clean it up now
                // that the new binding is committed.
                if let Some(old) = previous_vector {
                    if Some(&old) != vector_id.as_ref() {
                        self.delete_vector_with_tombstone(&old, &write.target_fqn)?;
                    }
                }
                Ok(SummaryWriteOutcome::Written { vector_id })
            }
            Ok(None) => {
                // Skipped: the vector written in phase 1 has no row to bind to.
                if let Some(fresh) = vector_id {
                    self.compensate_vector(&fresh, &write.target_fqn)?;
                }
                Ok(SummaryWriteOutcome::SkippedNotStale)
            }
            Err(err) => {
                if let Some(fresh) = vector_id {
                    self.compensate_vector(&fresh, &write.target_fqn)?;
                }
                Err(err)
            }
        }
    }

    /// Batched summary writes in one transaction. `AllOrNothing` rolls the
    /// whole batch back on the first failure; `BestEffort` records per-item
    /// failures and keeps going.
    pub fn batch_create_summaries(
        &self,
        writes: &[SummaryWrite],
        mode: BatchMode,
    ) -> Result<BatchSummaryReport> {
        if writes.is_empty() {
            return Ok(BatchSummaryReport::default());
        }

        // Phase 1 for the whole batch.
        let mut vector_ids: Vec<Option<String>> = Vec::with_capacity(writes.len());
        for write in writes {
            vector_ids.push(self.add_vector_phase(
                write.embedding.as_deref(),
                &write.target_fqn,
                write.level.as_str(),
            )?);
        }

        let now = now_millis();
        let mut report = BatchSummaryReport::default();
        let tx_result: Result<()> = self.with_tx(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO summaries \
                     (target_fqn, level, summary, vector_id, is_stale, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5) \
                 ON CONFLICT(target_fqn, level) DO UPDATE SET \
                     summary = excluded.summary, \
                     vector_id = excluded.vector_id, \
                     is_stale = 0, \
                     updated_at = excluded.updated_at",
            )?;
            for (write, vector_id) in writes.iter().zip(&vector_ids) {
                let result = stmt.execute(params![
                    write.target_fqn,
                    write.level.as_str(),
                    write.summary,
                    vector_id,
                    now,
                ]);
                match result {
                    Ok(_) => report.written += 1,
                    Err(err) => match mode {
                        BatchMode::AllOrNothing => return Err(err.into()),
                        BatchMode::BestEffort => {
                            report.failed.push((write.target_fqn.clone(), err.to_string()));
                        }
                    },
                }
            }
            Ok(())
        });

        match tx_result {
            Ok(()) => {
                // Best-effort items that failed still hold a phase-1 vector.
                for (write, vector_id) in writes.iter().zip(&vector_ids) {
                    let failed = report.failed.iter().any(|(fqn, _)| fqn == &write.target_fqn);
                    if failed {
                        if let Some(fresh) = vector_id {
                            self.compensate_vector(fresh, &write.target_fqn)?;
                        }
                    }
                }
                Ok(report)
            }
            Err(err) => {
                for (write, vector_id) in writes.iter().zip(&vector_ids) {
                    if let Some(fresh) = vector_id {
                        self.compensate_vector(fresh, &write.target_fqn)?;
                    }
                }
                Err(err)
            }
        }
    }

    pub fn get_summary(&self, fqn: &str, level: SummaryLevel) -> Result<Option<SummaryRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "SELECT target_fqn, level, summary, vector_id, is_stale, created_at, updated_at \
                 FROM summaries WHERE target_fqn = ?1 AND level = ?2",
            )?
            .query_row(params![fqn, level.as_str()], summary_from_row)
            .optional()
            .map_err(Into::into)
        })
    }

    /// Relational row first, vector second, tombstone on vector failure.
    pub fn delete_summary(&self, fqn: &str, level: SummaryLevel) -> Result<bool> {
        let vector_id: Option<String> = self.with_tx(|conn| {
            let existing: Option<Option<String>> = conn
                .prepare_cached(
                    "SELECT vector_id FROM summaries WHERE target_fqn = ?1 AND level = ?2",
                )?
                .query_row(params![fqn, level.as_str()], |row| row.get(0))
                .optional()?;
            let Some(vector_id) = existing else {
                return Ok(None);
            };
            conn.execute(
                "DELETE FROM summaries WHERE target_fqn = ?1 AND level = ?2",
                params![fqn, level.as_str()],
            )?;
            Ok(vector_id)
        })?;

        match vector_id {
            Some(vector_id) => {
                self.delete_vector_with_tombstone(&vector_id, fqn)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Glossary and constraints (same dual-write discipline)
    // ------------------------------------------------------------------

    pub fn upsert_glossary(
        &self,
        record: &GlossaryRecord,
        embedding: Option<&[f32]>,
    ) -> Result<Option<String>> {
        let vector_id = self.add_vector_phase(embedding, &record.code_term, "glossary")?;
        let now = now_millis();
        let tx_result: Result<Option<String>> = self.with_tx(|conn| {
            let previous: Option<Option<String>> = conn
                .prepare_cached("SELECT vector_id FROM glossary WHERE code_term = ?1")?
                .query_row([&record.code_term], |row| row.get(0))
                .optional()?;
            conn.prepare_cached(
                "INSERT INTO glossary \
                     (code_term, business_meaning, synonyms, source_fqn, vector_id, created_at) \
                 VALUES (?1, ?2, ?3, (SELECT s.fqn FROM symbols s WHERE s.fqn = ?4), ?5, ?6) \
                 ON CONFLICT(code_term) DO UPDATE SET \
                     business_meaning = excluded.business_meaning, \
                     synonyms = excluded.synonyms, \
                     source_fqn = excluded.source_fqn, \
                     vector_id = excluded.vector_id",
            )?
            .execute(params![
                record.code_term,
                record.business_meaning,
                serde_json::to_string(&record.synonyms).unwrap_or_else(|_| "[]".into()),
                record.source_fqn,
                vector_id,
                now,
            ])?;
            Ok(previous.flatten())
        });

        match tx_result {
            Ok(previous) => {
                if let Some(old) = previous {
                    if Some(&old) != vector_id.as_ref() {
                        self.delete_vector_with_tombstone(&old, &record.code_term)?;
                    }
                }
                Ok(vector_id)
            }
            Err(err) => {
                if let Some(fresh) = vector_id {
                    self.compensate_vector(&fresh, &record.code_term)?;
                }
                Err(err)
            }
        }
    }

    pub fn get_glossary(&self, code_term: &str) -> Result<Option<GlossaryRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "SELECT code_term, business_meaning, synonyms, source_fqn, vector_id, created_at \
                 FROM glossary WHERE code_term = ?1",
            )?
            .query_row([code_term], |row| {
                let synonyms: String = row.get(2)?;
                Ok(GlossaryRecord {
                    code_term: row.get(0)?,
                    business_meaning: row.get(1)?,
                    synonyms: serde_json::from_str(&synonyms).unwrap_or_default(),
                    source_fqn: row.get(3)?,
                    vector_id: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn upsert_constraint(
        &self,
        record: &ConstraintRecord,
        embedding: Option<&[f32]>,
    ) -> Result<Option<String>> {
        let vector_id = self.add_vector_phase(embedding, &record.name, "constraint")?;
        let tx_result: Result<Option<String>> = self.with_tx(|conn| {
            let previous: Option<Option<String>> = conn
                .prepare_cached("SELECT vector_id FROM constraints WHERE name = ?1")?
                .query_row([&record.name], |row| row.get(0))
                .optional()?;
            conn.prepare_cached(
                "INSERT INTO constraints \
                     (name, constraint_type, description, source_fqn, severity, vector_id) \
                 VALUES (?1, ?2, ?3, (SELECT s.fqn FROM symbols s WHERE s.fqn = ?4), ?5, ?6) \
                 ON CONFLICT(name) DO UPDATE SET \
                     constraint_type = excluded.constraint_type, \
                     description = excluded.description, \
                     source_fqn = excluded.source_fqn, \
                     severity = excluded.severity, \
                     vector_id = excluded.vector_id",
            )?
            .execute(params![
                record.name,
                record.constraint_type,
                record.description,
                record.source_fqn,
                record.severity.as_str(),
                vector_id,
            ])?;
            Ok(previous.flatten())
        });

        match tx_result {
            Ok(previous) => {
                if let Some(old) = previous {
                    if Some(&old) != vector_id.as_ref() {
                        self.delete_vector_with_tombstone(&old, &record.name)?;
                    }
                }
                Ok(vector_id)
            }
            Err(err) => {
                if let Some(fresh) = vector_id {
                    self.compensate_vector(&fresh, &record.name)?;
                }
                Err(err)
            }
        }
    }

    pub fn get_constraint(&self, name: &str) -> Result<Option<ConstraintRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "SELECT name, constraint_type, description, source_fqn, severity, vector_id \
                 FROM constraints WHERE name = ?1",
            )?
            .query_row([name], |row| {
                let severity: String = row.get(4)?;
                Ok(ConstraintRecord {
                    name: row.get(0)?,
                    constraint_type: row.get(1)?,
                    description: row.get(2)?,
                    source_fqn: row.get(3)?,
                    severity: Severity::parse(&severity).unwrap_or(Severity::Info),
                    vector_id: row.get(5)?,
                })
            })
            .optional()
            .map_err(Into::into)
        })
    }

    // ------------------------------------------------------------------
    // Pending vectors and reconciliation
    // ------------------------------------------------------------------

    pub fn pending_vectors(&self) -> Result<Vec<PendingVectorRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT vector_id, target_fqn, reason, recorded_at \
                 FROM pending_vectors ORDER BY recorded_at",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(PendingVectorRecord {
                    vector_id: row.get(0)?,
                    target_fqn: row.get(1)?,
                    reason: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    /// Retry vector deletion for tombstones older than `grace`. Returns how
    /// many were cleared.
    pub fn reconcile_vectors(&self, grace: Duration) -> Result<usize> {
        let Some(vector_store) = self.vector_store().cloned() else {
            return Ok(0);
        };
        let cutoff = now_millis().saturating_sub(grace.as_millis() as u64);
        let due: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT vector_id FROM pending_vectors WHERE recorded_at <= ?1",
            )?;
            let rows = stmt.query_map([cutoff], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })?;

        let mut cleared = 0usize;
        for vector_id in due {
            match vector_store.delete(&vector_id) {
                Ok(()) => {
                    self.with_conn(|conn| {
                        conn.execute(
                            "DELETE FROM pending_vectors WHERE vector_id = ?1",
                            [&vector_id],
                        )?;
                        Ok(())
                    })?;
                    cleared += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        target = "minerva.store",
                        vector_id,
                        error = %err,
                        "pending vector still undeletable; will retry"
                    );
                }
            }
        }
        Ok(cleared)
    }

    /// Phase 1: write the embedding under a fresh id. A vector-store failure
    /// here is transient by taxonomy: the relational write proceeds with
    /// `vector_id = NULL` rather than failing the summary.
    fn add_vector_phase(
        &self,
        embedding: Option<&[f32]>,
        target_fqn: &str,
        level: &str,
    ) -> Result<Option<String>> {
        let (Some(vector_store), Some(embedding)) = (self.vector_store(), embedding) else {
            return Ok(None);
        };
        let vector_id = Uuid::new_v4().to_string();
        let mut metadata = minerva_vector::VectorMetadata::new();
        metadata.insert("target_fqn".to_string(), target_fqn.to_string());
        metadata.insert("level".to_string(), level.to_string());
        match vector_store.add(&vector_id, embedding, metadata) {
            Ok(()) => Ok(Some(vector_id)),
            Err(err) => {
                tracing::warn!(
                    target = "minerva.store",
                    target_fqn,
                    error = %err,
                    "vector write failed; committing row with vector_id = NULL"
                );
                Ok(None)
            }
        }
    }

    /// Compensating delete after a failed or skipped relational write. If the
    /// delete fails, the orphan is recorded through a separate connection;
    /// the aborted transaction cannot carry tracking rows, and dropping the
    /// record would leak the vector silently.
    fn compensate_vector(&self, vector_id: &str, target_fqn: &str) -> Result<()> {
        let Some(vector_store) = self.vector_store() else {
            return Ok(());
        };
        if let Err(delete_err) = vector_store.delete(vector_id) {
            tracing::error!(
                target = "minerva.store",
                vector_id,
                target_fqn,
                error = %delete_err,
                "compensating vector delete failed; recording orphan"
            );
            self.record_pending_vector(vector_id, target_fqn, REASON_ROLLBACK_FAILED)?;
        }
        Ok(())
    }

    /// Vector delete with a tombstone on failure (used after relational
    /// deletes and replacements).
    pub(crate) fn delete_vector_with_tombstone(
        &self,
        vector_id: &str,
        target_fqn: &str,
    ) -> Result<()> {
        let Some(vector_store) = self.vector_store() else {
            return Ok(());
        };
        if let Err(err) = vector_store.delete(vector_id) {
            tracing::warn!(
                target = "minerva.store",
                vector_id,
                error = %err,
                "vector delete failed; recording tombstone"
            );
            self.record_pending_vector(vector_id, target_fqn, REASON_DELETE_FAILED)?;
        }
        Ok(())
    }

    /// Insert a `pending_vectors` row through a dedicated connection.
    pub(crate) fn record_pending_vector(
        &self,
        vector_id: &str,
        target_fqn: &str,
        reason: &str,
    ) -> Result<()> {
        let insert = || -> Result<()> {
            let conn = open_configured(self.path())?;
            conn.execute(
                "INSERT INTO pending_vectors (vector_id, target_fqn, reason, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(vector_id) DO UPDATE SET \
                     reason = excluded.reason, \
                     recorded_at = excluded.recorded_at",
                params![vector_id, target_fqn, reason, now_millis()],
            )?;
            Ok(())
        };
        insert().map_err(|err| StoreError::OrphanTracking {
            vector_id: vector_id.to_string(),
            target_fqn: target_fqn.to_string(),
            message: err.to_string(),
        })
    }
}

pub(crate) fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRecord> {
    let level: String = row.get(1)?;
    Ok(SummaryRecord {
        target_fqn: row.get(0)?,
        level: SummaryLevel::parse(&level).unwrap_or(SummaryLevel::Method),
        summary: row.get(2)?,
        vector_id: row.get(3)?,
        is_stale: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
