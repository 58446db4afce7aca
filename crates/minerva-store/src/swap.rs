//! Startup recovery from an interrupted shadow swap.
//!
//! The rebuilder's three-way swap (`new → tmp_swap`, `current → backup`,
//! `tmp_swap → current`) guarantees at least one valid database file exists
//! at every intermediate state. This module runs on store open and promotes
//! the right file when `current` is missing, or cleans a stale `tmp_swap`
//! left next to an intact `current`.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::error::{Result, StoreError};

pub const TMP_SWAP_SUFFIX: &str = "tmp_swap";
pub const BACKUP_INFIX: &str = "backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRecovery {
    /// `current` present and no leftovers.
    Clean,
    /// `current` present; a stale `tmp_swap` was deleted.
    RemovedStaleTmpSwap,
    /// `current` was missing; a sibling was promoted.
    Promoted { from: PathBuf },
}

/// `<db>.<suffix>` next to the database file.
pub fn sibling_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{suffix}"));
    db_path.with_file_name(name)
}

/// True when the file opens as SQLite, passes `integrity_check`, and carries
/// a `symbols` table.
pub fn is_valid_database(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Ok(conn) = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) else {
        return false;
    };
    let ok: std::result::Result<String, _> =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0));
    if !matches!(ok.as_deref(), Ok("ok")) {
        return false;
    }
    let has_symbols: std::result::Result<bool, _> = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='symbols')",
        [],
        |row| row.get(0),
    );
    matches!(has_symbols, Ok(true))
}

/// Newest `<db>.backup.<ts>` sibling, by the timestamp embedded in the name.
pub(crate) fn newest_backup(db_path: &Path) -> Option<PathBuf> {
    let dir = db_path.parent()?;
    let base = db_path.file_name()?.to_string_lossy().to_string();
    let prefix = format!("{base}.{BACKUP_INFIX}.");

    let mut best: Option<(u64, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).ok()? {
        let entry = entry.ok()?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(ts_text) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(ts) = ts_text.parse::<u64>() else {
            continue;
        };
        match &best {
            Some((best_ts, _)) if *best_ts >= ts => {}
            _ => best = Some((ts, entry.path())),
        }
    }
    best.map(|(_, path)| path)
}

/// Detect and repair an incomplete swap. Called before the first connection
/// is opened.
pub(crate) fn recover_incomplete_swap(db_path: &Path) -> Result<SwapRecovery> {
    let tmp_swap = sibling_path(db_path, TMP_SWAP_SUFFIX);

    if db_path.exists() {
        if tmp_swap.exists() {
            // Crash landed between moving the new build to tmp_swap and
            // retiring current: current is still the authoritative database.
            std::fs::remove_file(&tmp_swap).map_err(|source| StoreError::Io {
                path: tmp_swap.clone(),
                source,
            })?;
            tracing::warn!(
                target = "minerva.store",
                path = %tmp_swap.display(),
                "removed stale tmp_swap left by an interrupted rebuild"
            );
            return Ok(SwapRecovery::RemovedStaleTmpSwap);
        }
        return Ok(SwapRecovery::Clean);
    }

    // `current` is missing: promote tmp_swap first (it holds the newest
    // complete build), then fall back to the newest valid backup.
    let mut candidates: Vec<PathBuf> = Vec::new();
    if tmp_swap.exists() {
        candidates.push(tmp_swap);
    }
    if let Some(backup) = newest_backup(db_path) {
        candidates.push(backup);
    }

    let had_candidates = !candidates.is_empty();
    for candidate in candidates {
        if is_valid_database(&candidate) {
            std::fs::rename(&candidate, db_path).map_err(|source| StoreError::Io {
                path: candidate.clone(),
                source,
            })?;
            tracing::warn!(
                target = "minerva.store",
                promoted = %candidate.display(),
                "recovered database from interrupted swap"
            );
            return Ok(SwapRecovery::Promoted { from: candidate });
        }
        tracing::error!(
            target = "minerva.store",
            candidate = %candidate.display(),
            "swap-recovery candidate failed validation; trying next"
        );
    }

    // A brand-new store (nothing on disk at all) is not a failed swap.
    if !had_candidates {
        return Ok(SwapRecovery::Clean);
    }

    Err(StoreError::SwapUnrecoverable(format!(
        "{} is missing and no sibling passed validation",
        db_path.display()
    )))
}
