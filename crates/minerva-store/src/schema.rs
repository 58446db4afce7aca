//! Schema DDL and the versioned migration runner.
//!
//! Migrations apply in order on store open. A destructive migration exposes
//! a preview of the rows it would purge and writes them to a
//! `deleted_orphans_backup_<ver>` table inside the same transaction as the
//! destructive change, so purged rows stay recoverable.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::connection::in_transaction;
use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS symbols (
    fqn         TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    name        TEXT NOT NULL,
    file_path   TEXT NOT NULL DEFAULT '',
    line_number INTEGER NOT NULL DEFAULT 0,
    modifiers   TEXT NOT NULL DEFAULT '[]',
    signature   TEXT,
    parent_fqn  TEXT REFERENCES symbols(fqn) ON DELETE CASCADE,
    annotations TEXT NOT NULL DEFAULT '[]',
    attributes  TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_symbols_file_path ON symbols(file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_fqn);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

CREATE TABLE IF NOT EXISTS edges (
    from_fqn TEXT NOT NULL REFERENCES symbols(fqn) ON DELETE CASCADE,
    to_fqn   TEXT NOT NULL REFERENCES symbols(fqn) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    kind     TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (from_fqn, to_fqn, relation, kind)
);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_fqn, relation);

CREATE TABLE IF NOT EXISTS summaries (
    target_fqn TEXT NOT NULL REFERENCES symbols(fqn) ON DELETE CASCADE,
    level      TEXT NOT NULL,
    summary    TEXT NOT NULL,
    vector_id  TEXT,
    is_stale   INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (target_fqn, level)
);
CREATE INDEX IF NOT EXISTS idx_summaries_stale ON summaries(is_stale);
CREATE INDEX IF NOT EXISTS idx_summaries_vector ON summaries(vector_id);

CREATE TABLE IF NOT EXISTS glossary (
    code_term        TEXT PRIMARY KEY,
    business_meaning TEXT NOT NULL,
    synonyms         TEXT NOT NULL DEFAULT '[]',
    source_fqn       TEXT REFERENCES symbols(fqn) ON DELETE SET NULL,
    vector_id        TEXT,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS constraints (
    name            TEXT PRIMARY KEY,
    constraint_type TEXT NOT NULL,
    description     TEXT NOT NULL,
    source_fqn      TEXT REFERENCES symbols(fqn) ON DELETE SET NULL,
    severity        TEXT NOT NULL,
    vector_id       TEXT
);

CREATE TABLE IF NOT EXISTS entry_points (
    symbol_fqn      TEXT PRIMARY KEY REFERENCES symbols(fqn) ON DELETE CASCADE,
    entry_type      TEXT NOT NULL,
    http_method     TEXT,
    http_path       TEXT,
    cron_expression TEXT,
    mq_queue        TEXT
);

CREATE TABLE IF NOT EXISTS anti_patterns (
    id          INTEGER PRIMARY KEY,
    rule_id     TEXT NOT NULL,
    from_fqn    TEXT NOT NULL REFERENCES symbols(fqn) ON DELETE CASCADE,
    to_fqn      TEXT REFERENCES symbols(fqn) ON DELETE SET NULL,
    severity    TEXT NOT NULL,
    message     TEXT NOT NULL,
    detected_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    job_id      TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    started_at  INTEGER,
    finished_at INTEGER,
    payload     BLOB NOT NULL DEFAULT x'',
    error       TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

CREATE TABLE IF NOT EXISTS pending_vectors (
    vector_id   TEXT PRIMARY KEY,
    target_fqn  TEXT NOT NULL,
    reason      TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS indexed_files (
    file_path    TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    indexed_at   INTEGER NOT NULL
);
"#;

/// Per-table row counts a destructive migration would remove or rewrite.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationPreview {
    pub affected: BTreeMap<String, u64>,
}

impl MigrationPreview {
    pub fn is_empty(&self) -> bool {
        self.affected.values().all(|&count| count == 0)
    }
}

pub(crate) struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub preview: fn(&Connection) -> Result<MigrationPreview>,
    pub apply: fn(&Connection) -> Result<()>,
}

pub(crate) fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create schema",
            preview: |_conn| Ok(MigrationPreview::default()),
            apply: |conn| {
                conn.execute_batch(CREATE_SCHEMA)?;
                Ok(())
            },
        },
        Migration {
            version: 2,
            name: "purge edges with missing endpoints",
            preview: preview_orphan_edges,
            apply: apply_purge_orphan_edges,
        },
    ]
}

pub(crate) fn current_version(conn: &Connection) -> Result<i64> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the stored version, in order, each in
/// its own transaction. Failure aborts that transaction and surfaces the
/// version that failed.
pub(crate) fn run_migrations(conn: &Connection) -> Result<i64> {
    let mut version = current_version(conn)?;
    for migration in migrations() {
        if migration.version <= version {
            continue;
        }
        tracing::info!(
            target = "minerva.store",
            version = migration.version,
            name = migration.name,
            "applying migration"
        );
        in_transaction(conn, |conn| {
            (migration.apply)(conn).map_err(|err| StoreError::Migration {
                version: migration.version,
                message: err.to_string(),
            })?;
            conn.execute("DELETE FROM schema_version", [])?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [migration.version],
            )?;
            Ok(())
        })?;
        version = migration.version;
    }
    Ok(version)
}

/// Preview a pending destructive migration without applying anything.
pub fn preview_migration(conn: &Connection, version: i64) -> Result<MigrationPreview> {
    for migration in migrations() {
        if migration.version == version {
            return (migration.preview)(conn);
        }
    }
    Err(StoreError::Migration {
        version,
        message: "unknown migration version".to_string(),
    })
}

const ORPHAN_EDGE_FILTER: &str = "NOT EXISTS(SELECT 1 FROM symbols s WHERE s.fqn = edges.from_fqn) \
     OR NOT EXISTS(SELECT 1 FROM symbols s WHERE s.fqn = edges.to_fqn)";

fn preview_orphan_edges(conn: &Connection) -> Result<MigrationPreview> {
    let count: u64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM edges WHERE {ORPHAN_EDGE_FILTER}"),
        [],
        |row| row.get(0),
    )?;
    let mut preview = MigrationPreview::default();
    preview.affected.insert("edges".to_string(), count);
    Ok(preview)
}

fn apply_purge_orphan_edges(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS deleted_orphans_backup_2 (
             from_fqn TEXT NOT NULL,
             to_fqn   TEXT NOT NULL,
             relation TEXT NOT NULL,
             kind     TEXT NOT NULL,
             metadata TEXT NOT NULL
         );",
    )?;
    conn.execute(
        &format!(
            "INSERT INTO deleted_orphans_backup_2 \
             SELECT from_fqn, to_fqn, relation, kind, metadata FROM edges WHERE {ORPHAN_EDGE_FILTER}"
        ),
        [],
    )?;
    let purged = conn.execute(
        &format!("DELETE FROM edges WHERE {ORPHAN_EDGE_FILTER}"),
        [],
    )?;
    if purged > 0 {
        tracing::warn!(
            target = "minerva.store",
            purged,
            "purged orphaned edges; originals kept in deleted_orphans_backup_2"
        );
    }
    Ok(())
}
