//! The relational half of the dual store, over SQLite.
//!
//! `GraphStore` persists symbols, edges, summaries, glossary terms,
//! constraints, entry points, anti-patterns, and jobs, and keeps the paired
//! vector store consistent through two-phase dual-writes with orphan
//! reconciliation. Traversal queries (impact, call chains, coverage) run as
//! single recursive CTEs.
//!
//! Connection model: WAL journaling, enforced foreign keys, a 30-second busy
//! timeout, and one lazily-opened connection per thread; the store instance
//! itself holds no connection, which is what lets the summariser pool write
//! concurrently.

#![forbid(unsafe_code)]

mod connection;
mod dual_write;
mod error;
mod jobs;
mod query;
mod schema;
mod store;
mod swap;

pub use crate::dual_write::{
    BatchMode, BatchSummaryReport, SummaryWrite, SummaryWriteOutcome,
};
pub use crate::error::{Result, StoreError};
pub use crate::query::{CoverageHit, CoverageReport, TraversalHit, TRAVERSAL_LIMIT};
pub use crate::schema::{preview_migration, MigrationPreview, SCHEMA_VERSION};
pub use crate::store::{EdgeInsertReport, GraphStore, OrphanReport};
pub use crate::swap::{
    is_valid_database, sibling_path, SwapRecovery, BACKUP_INFIX, TMP_SWAP_SUFFIX,
};
