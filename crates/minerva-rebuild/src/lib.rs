//! Full (shadow) and incremental index rebuilds.
//!
//! The shadow rebuilder populates a sibling database file from scratch, runs
//! an integrity suite against it, and swaps it in with a three-way atomic
//! move that never leaves the serving path without a valid database. The
//! incremental coordinator re-indexes only changed classfiles and their
//! one-hop dependents, marking staleness atomically before driving
//! re-summarisation.

#![forbid(unsafe_code)]

mod error;
mod extract;
mod incremental;
mod replace;
mod shadow;

pub use crate::error::RebuildError;
pub use crate::extract::{extract_files, ExtractReport};
pub use crate::incremental::{
    ChangeDetector, ChangeSet, ContentHashDetector, ExplicitChanges, IncrementalCoordinator,
    IncrementalReport,
};
pub use crate::replace::replace_file;
pub use crate::shadow::{
    sweep_backups, IntegrityReport, IntegrityThresholds, RebuildOutcome, ShadowRebuilder,
};

/// Collect every `.class` file under `root`, sorted for deterministic
/// extraction order.
pub fn collect_classfiles(root: &std::path::Path) -> Result<Vec<std::path::PathBuf>, RebuildError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(|err| RebuildError::Walk {
            root: root.to_path_buf(),
            message: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some("class") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
