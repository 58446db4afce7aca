//! Incremental re-indexing of changed classfiles.
//!
//! Affected set = symbols in changed files ∪ their one-hop callers ∪ their
//! parents. Staleness is marked in one transaction before anything is
//! re-extracted; re-summarisation writes re-check the stale flag so a
//! concurrent refresh is never overwritten.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use minerva_ai::{CancellationToken, ParallelSummariser, SummariseReport};
use minerva_analyzer::ClassAnalyser;
use minerva_store::GraphStore;

use crate::error::RebuildError;
use crate::extract::{extract_files, hash_file, ExtractReport};

/// Files the detector found different from the index.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub changed: Vec<PathBuf>,
    /// Indexed paths that no longer exist on disk.
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Strategy for resolving what changed since the last build.
pub trait ChangeDetector: Send + Sync {
    fn detect(&self, store: &GraphStore, root: &Path) -> Result<ChangeSet, RebuildError>;
}

/// Default detector: walk the tree, compare blake3 content hashes against
/// `indexed_files`.
#[derive(Debug, Default, Clone)]
pub struct ContentHashDetector;

impl ChangeDetector for ContentHashDetector {
    fn detect(&self, store: &GraphStore, root: &Path) -> Result<ChangeSet, RebuildError> {
        let indexed: std::collections::HashMap<String, String> =
            store.indexed_file_hashes()?.into_iter().collect();

        let mut set = ChangeSet::default();
        let mut on_disk: BTreeSet<String> = BTreeSet::new();
        for path in crate::collect_classfiles(root)? {
            let key = path.to_string_lossy().into_owned();
            on_disk.insert(key.clone());
            let hash = hash_file(&path)?;
            if indexed.get(&key) != Some(&hash) {
                set.changed.push(path);
            }
        }
        for known in indexed.keys() {
            if !on_disk.contains(known) {
                set.deleted.push(known.clone());
            }
        }
        set.deleted.sort();
        Ok(set)
    }
}

/// Detector fed an explicit list (version-control diff output, a watcher
/// event batch). Paths that no longer exist are treated as deletions.
#[derive(Debug, Default, Clone)]
pub struct ExplicitChanges {
    pub paths: Vec<PathBuf>,
}

impl ExplicitChanges {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl ChangeDetector for ExplicitChanges {
    fn detect(&self, _store: &GraphStore, _root: &Path) -> Result<ChangeSet, RebuildError> {
        let mut set = ChangeSet::default();
        for path in &self.paths {
            if path.exists() {
                set.changed.push(path.clone());
            } else {
                set.deleted.push(path.to_string_lossy().into_owned());
            }
        }
        Ok(set)
    }
}

#[derive(Debug, Default)]
pub struct IncrementalReport {
    pub changed_files: usize,
    pub deleted_files: usize,
    pub affected_fqns: Vec<String>,
    pub marked_stale: usize,
    pub extract: ExtractReport,
    pub summarise: Option<SummariseReport>,
}

pub struct IncrementalCoordinator<'a> {
    store: &'a GraphStore,
    analyser: &'a ClassAnalyser,
    summariser: Option<&'a ParallelSummariser>,
}

impl<'a> IncrementalCoordinator<'a> {
    pub fn new(store: &'a GraphStore, analyser: &'a ClassAnalyser) -> Self {
        Self {
            store,
            analyser,
            summariser: None,
        }
    }

    pub fn with_summariser(mut self, summariser: &'a ParallelSummariser) -> Self {
        self.summariser = Some(summariser);
        self
    }

    /// Run the incremental pipeline for a pre-resolved change set. An empty
    /// set is a no-op returning zero counts.
    pub fn rebuild(
        &self,
        changes: ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<IncrementalReport, RebuildError> {
        let mut report = IncrementalReport {
            changed_files: changes.changed.len(),
            deleted_files: changes.deleted.len(),
            ..IncrementalReport::default()
        };
        if changes.is_empty() {
            return Ok(report);
        }
        if cancel.is_cancelled() {
            return Err(RebuildError::Cancelled);
        }

        // Affected = symbols in touched files ∪ 1-hop callers ∪ parents.
        let mut touched_paths: Vec<String> = changes
            .changed
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        touched_paths.extend(changes.deleted.iter().cloned());
        let changed_fqns = self.store.symbols_in_files(&touched_paths)?;
        let dependents = self.store.callers_of(&changed_fqns)?;
        let parents = self.store.parents_of(&changed_fqns)?;

        let affected: BTreeSet<String> = changed_fqns
            .iter()
            .chain(&dependents)
            .chain(&parents)
            .cloned()
            .collect();
        let affected: Vec<String> = affected.into_iter().collect();

        // The single staleness write of the pipeline.
        report.marked_stale = self.store.mark_stale(&affected)?;
        report.affected_fqns = affected.clone();

        if cancel.is_cancelled() {
            return Err(RebuildError::Cancelled);
        }

        // Deleted files: drop their top-level symbols; cascade removes
        // members, edges, summaries, and entry points.
        if !changes.deleted.is_empty() {
            let doomed = self.store.symbols_in_files(&changes.deleted)?;
            for fqn in doomed {
                match self.store.get_symbol(&fqn)? {
                    Some(symbol) if symbol.parent_fqn.is_none() => {
                        self.store.delete_symbol(&fqn)?;
                    }
                    _ => {}
                }
            }
            self.store.forget_indexed_files(&changes.deleted)?;
        }

        // Re-extraction overwrites symbols/edges/attributes via upsert.
        report.extract =
            extract_files(self.store, self.analyser, &changes.changed, &|| {
                cancel.is_cancelled()
            })?;

        // Re-summarise the affected set; each write re-checks the stale flag
        // before clearing it.
        if let Some(summariser) = self.summariser {
            if cancel.is_cancelled() {
                return Err(RebuildError::Cancelled);
            }
            report.summarise = Some(summariser.summarise(self.store, &affected, cancel, None));
        }

        Ok(report)
    }

    /// Detect changes under `root` with `detector`, then rebuild.
    pub fn rebuild_detected(
        &self,
        detector: &dyn ChangeDetector,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IncrementalReport, RebuildError> {
        let changes = detector.detect(self.store, root)?;
        self.rebuild(changes, cancel)
    }
}
