//! Shadow rebuild: build into `<db>.new.<ts>`, verify, swap atomically.
//!
//! Swap protocol (every step an atomic replace):
//!   1. `new → current.tmp_swap`
//!   2. `current → current.backup.<ts>` (when current exists)
//!   3. `current.tmp_swap → current`
//! At every intermediate state at least one fully valid database file is on
//! disk; the store's open-time recovery promotes the right one after a
//! crash.

use std::path::{Path, PathBuf};

use minerva_analyzer::ClassAnalyser;
use minerva_model::now_millis;
use minerva_store::{is_valid_database, sibling_path, GraphStore, BACKUP_INFIX, TMP_SWAP_SUFFIX};

use crate::error::RebuildError;
use crate::extract::{extract_files, ExtractReport};
use crate::replace::{remove_sidecars, replace_file};

#[derive(Debug, Clone)]
pub struct IntegrityThresholds {
    /// Reject a rebuild that produced fewer symbols than this floor.
    pub min_symbols: u64,
    /// Reject when more than this share of summaries is stale.
    pub max_stale_ratio: f64,
}

impl Default for IntegrityThresholds {
    fn default() -> Self {
        Self {
            min_symbols: 1,
            max_stale_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub symbol_count: u64,
    pub edge_count: u64,
    pub orphan_edges: u64,
    pub stale_summaries: u64,
    pub failures: Vec<String>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct RebuildOutcome {
    pub extract: ExtractReport,
    pub integrity: IntegrityReport,
    pub backup_path: Option<PathBuf>,
}

pub struct ShadowRebuilder<'a> {
    store: &'a GraphStore,
    analyser: &'a ClassAnalyser,
    thresholds: IntegrityThresholds,
}

impl<'a> ShadowRebuilder<'a> {
    pub fn new(store: &'a GraphStore, analyser: &'a ClassAnalyser) -> Self {
        Self {
            store,
            analyser,
            thresholds: IntegrityThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: IntegrityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Full rebuild of `files` into a fresh sibling database, then the
    /// three-way swap. The serving store stays untouched until the final
    /// move; its cached connections are invalidated afterwards.
    pub fn rebuild(
        &self,
        files: &[PathBuf],
        should_cancel: &dyn Fn() -> bool,
    ) -> Result<RebuildOutcome, RebuildError> {
        let db_path = self.store.path().to_path_buf();
        let ts = now_millis();
        let new_db = sibling_path(&db_path, &format!("new.{ts}"));

        // Phase 1: populate the shadow database.
        let build_result = self.populate(&new_db, files, should_cancel);
        let (extract, integrity) = match build_result {
            Ok(value) => value,
            Err(err) => {
                discard(&new_db);
                return Err(err);
            }
        };
        if !integrity.passed() {
            tracing::error!(
                target = "minerva.rebuild",
                failures = ?integrity.failures,
                "integrity suite rejected the new database"
            );
            discard(&new_db);
            return Err(RebuildError::IntegrityFailed(integrity));
        }
        if should_cancel() {
            discard(&new_db);
            return Err(RebuildError::Cancelled);
        }

        // Phase 2: three-way atomic swap.
        let backup_path = self.swap(&db_path, &new_db, ts)?;
        self.store.bump_generation();
        tracing::info!(
            target = "minerva.rebuild",
            db = %db_path.display(),
            symbols = integrity.symbol_count,
            edges = integrity.edge_count,
            "shadow rebuild swapped in"
        );

        Ok(RebuildOutcome {
            extract,
            integrity,
            backup_path,
        })
    }

    fn populate(
        &self,
        new_db: &Path,
        files: &[PathBuf],
        should_cancel: &dyn Fn() -> bool,
    ) -> Result<(ExtractReport, IntegrityReport), RebuildError> {
        let shadow = GraphStore::open(new_db)?;
        let extract = extract_files(&shadow, self.analyser, files, should_cancel)?;
        let integrity = self.check_integrity(&shadow)?;
        // Dropping the shadow store closes this thread's connection, which
        // checkpoints and removes the WAL before the file is moved.
        drop(shadow);
        remove_sidecars(new_db);
        Ok((extract, integrity))
    }

    fn check_integrity(&self, shadow: &GraphStore) -> Result<IntegrityReport, RebuildError> {
        let mut report = IntegrityReport {
            symbol_count: shadow.symbol_count()?,
            edge_count: shadow.edge_count()?,
            orphan_edges: shadow.orphan_edge_count()?,
            stale_summaries: shadow.stale_count()?,
            failures: Vec::new(),
        };

        if report.symbol_count < self.thresholds.min_symbols {
            report.failures.push(format!(
                "symbol count {} below floor {}",
                report.symbol_count, self.thresholds.min_symbols
            ));
        }
        if report.orphan_edges > 0 {
            report
                .failures
                .push(format!("{} orphaned edges", report.orphan_edges));
        }
        if !shadow.foreign_keys_consistent()? {
            report.failures.push("foreign_key_check reported rows".into());
        }
        if report.symbol_count > 0 {
            let ratio = report.stale_summaries as f64 / report.symbol_count as f64;
            if ratio > self.thresholds.max_stale_ratio {
                report.failures.push(format!(
                    "stale ratio {ratio:.2} above threshold {:.2}",
                    self.thresholds.max_stale_ratio
                ));
            }
        }
        Ok(report)
    }

    fn swap(
        &self,
        db_path: &Path,
        new_db: &Path,
        ts: u64,
    ) -> Result<Option<PathBuf>, RebuildError> {
        let tmp_swap = sibling_path(db_path, TMP_SWAP_SUFFIX);
        let backup = sibling_path(db_path, &format!("{BACKUP_INFIX}.{ts}"));

        let result = (|| -> Result<Option<PathBuf>, RebuildError> {
            replace_file(new_db, &tmp_swap)?;
            let backup_path = if db_path.exists() {
                // Fold the serving database's WAL into the main file so the
                // retired backup is self-contained.
                self.store.checkpoint()?;
                replace_file(db_path, &backup)?;
                Some(backup.clone())
            } else {
                None
            };
            replace_file(&tmp_swap, db_path)?;
            Ok(backup_path)
        })();

        match result {
            Ok(backup_path) => Ok(backup_path),
            Err(err) => Err(self.recover_swap(db_path, &tmp_swap, &backup, new_db, err)),
        }
    }

    /// In-order recovery after a failed swap step: tmp_swap, then backup,
    /// then the unswapped new build. Exhausting every path is the only
    /// fatal mode.
    fn recover_swap(
        &self,
        db_path: &Path,
        tmp_swap: &Path,
        backup: &Path,
        new_db: &Path,
        cause: RebuildError,
    ) -> RebuildError {
        if db_path.exists() {
            return RebuildError::SwapFailed {
                message: cause.to_string(),
                recovered: true,
            };
        }
        for candidate in [tmp_swap, backup, new_db] {
            if is_valid_database(candidate) && replace_file(candidate, db_path).is_ok() {
                tracing::error!(
                    target = "minerva.rebuild",
                    promoted = %candidate.display(),
                    error = %cause,
                    "swap failed; recovered serving database"
                );
                return RebuildError::SwapFailed {
                    message: cause.to_string(),
                    recovered: true,
                };
            }
        }
        tracing::error!(
            target = "minerva.rebuild",
            db = %db_path.display(),
            error = %cause,
            "swap failed and no recovery path succeeded"
        );
        RebuildError::SwapFailed {
            message: cause.to_string(),
            recovered: false,
        }
    }
}

/// Delete `<db>.backup.<ts>` siblings older than `retention`. Returns how
/// many were removed. Safe to run from a background thread.
pub fn sweep_backups(db_path: &Path, retention: std::time::Duration) -> usize {
    let Some(dir) = db_path.parent() else {
        return 0;
    };
    let Some(base) = db_path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return 0;
    };
    let prefix = format!("{base}.{BACKUP_INFIX}.");
    let cutoff = now_millis().saturating_sub(retention.as_millis() as u64);

    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(ts_text) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(ts) = ts_text.parse::<u64>() else {
            continue;
        };
        if ts < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::debug!(
                        target = "minerva.rebuild",
                        path = %entry.path().display(),
                        error = %err,
                        "failed to remove expired backup"
                    );
                }
            }
        }
    }
    removed
}

fn discard(new_db: &Path) {
    remove_sidecars(new_db);
    if let Err(err) = std::fs::remove_file(new_db) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                target = "minerva.rebuild",
                path = %new_db.display(),
                error = %err,
                "failed to delete rejected shadow database"
            );
        }
    }
}
