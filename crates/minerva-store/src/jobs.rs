//! Durable job tracking for background rebuilds.
//!
//! Acquisition is a single conditional `UPDATE ... RETURNING`: the row flips
//! to `running` and comes back in one statement, or it was already taken.
//! Check-then-update is a TOCTOU bug and never appears here.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use minerva_model::{now_millis, JobRecord, JobStatus};

use crate::error::{Result, StoreError};
use crate::store::GraphStore;

impl GraphStore {
    pub fn enqueue_job(&self, kind: &str, payload: &[u8]) -> Result<JobRecord> {
        let record = JobRecord {
            job_id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            status: JobStatus::Pending,
            created_at: now_millis(),
            started_at: None,
            finished_at: None,
            payload: payload.to_vec(),
            error: None,
        };
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO jobs (job_id, kind, status, created_at, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                record.job_id,
                record.kind,
                record.status.as_str(),
                record.created_at,
                record.payload,
            ])?;
            Ok(())
        })?;
        Ok(record)
    }

    /// Atomically claim a pending job. `None` means another worker won the
    /// race; contention is serialised entirely by the store.
    pub fn acquire_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "UPDATE jobs SET status = 'running', started_at = ?2 \
                 WHERE job_id = ?1 AND status = 'pending' \
                 RETURNING job_id, kind, status, created_at, started_at, finished_at, payload, error",
            )?
            .query_row(params![job_id, now_millis()], job_from_row)
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn complete_job(&self, job_id: &str, error: Option<&str>) -> Result<()> {
        let status = if error.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        let updated = self.with_conn(|conn| {
            Ok(conn
                .prepare_cached(
                    "UPDATE jobs SET status = ?2, finished_at = ?3, error = ?4 WHERE job_id = ?1",
                )?
                .execute(params![job_id, status.as_str(), now_millis(), error])?)
        })?;
        if updated == 0 {
            return Err(StoreError::JobConflict {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    /// Request cancellation. Only pending/running jobs can be cancelled;
    /// rebuild drivers poll [`GraphStore::job_cancelled`] between phases.
    pub fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let updated = self.with_conn(|conn| {
            Ok(conn
                .prepare_cached(
                    "UPDATE jobs SET status = 'cancelled', finished_at = ?2 \
                     WHERE job_id = ?1 AND status IN ('pending', 'running')",
                )?
                .execute(params![job_id, now_millis()])?)
        })?;
        Ok(updated > 0)
    }

    pub fn job_cancelled(&self, job_id: &str) -> Result<bool> {
        Ok(self
            .get_job(job_id)?
            .map(|job| job.status == JobStatus::Cancelled)
            .unwrap_or(false))
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "SELECT job_id, kind, status, created_at, started_at, finished_at, payload, error \
                 FROM jobs WHERE job_id = ?1",
            )?
            .query_row([job_id], job_from_row)
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn list_jobs(&self, filter: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        self.with_conn(|conn| {
            let mut out = Vec::new();
            match filter {
                Some(status) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT job_id, kind, status, created_at, started_at, finished_at, payload, error \
                         FROM jobs WHERE status = ?1 ORDER BY created_at",
                    )?;
                    let rows = stmt.query_map([status.as_str()], job_from_row)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT job_id, kind, status, created_at, started_at, finished_at, payload, error \
                         FROM jobs ORDER BY created_at",
                    )?;
                    let rows = stmt.query_map([], job_from_row)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
            }
            Ok(out)
        })
    }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(2)?;
    Ok(JobRecord {
        job_id: row.get(0)?,
        kind: row.get(1)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        created_at: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        payload: row.get(6)?,
        error: row.get(7)?,
    })
}
