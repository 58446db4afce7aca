use std::path::PathBuf;
use std::sync::Arc;

use minerva_ai::{CancellationToken, ParallelSummariser, SummariseReport, Summariser};
use minerva_analyzer::ClassAnalyser;
use minerva_model::{
    EntryPointKind, EntryPointRecord, JobRecord, JobStatus, SummaryLevel, SymbolRecord,
};
use minerva_rebuild::{
    collect_classfiles, extract_files, sweep_backups, ExtractReport, IncrementalCoordinator,
    IncrementalReport, RebuildOutcome, ShadowRebuilder,
};
use minerva_store::{CoverageReport, GraphStore, TraversalHit};
use minerva_vector::{Embedder, FileVectorStore, VectorStore};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::rules;

pub const JOB_REBUILD_FULL: &str = "rebuild_full";
pub const JOB_REBUILD_INCREMENTAL: &str = "rebuild_incremental";

/// A semantic (or name-match fallback) search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub fqn: String,
    pub score: f32,
    pub summary: Option<String>,
}

/// The synchronous in-process facade every adapter talks to.
///
/// Owns the dual store, the analyser, and (when a provider is configured)
/// the parallel summariser. All operations are safe to call from multiple
/// threads; relational access uses per-thread connections throughout.
pub struct KnowledgeEngine {
    config: EngineConfig,
    store: GraphStore,
    analyser: ClassAnalyser,
    summariser: Option<ParallelSummariser>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl KnowledgeEngine {
    /// Open the engine: vector snapshot, relational store (running swap
    /// recovery, migrations, and vector reconciliation), no summariser.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let vectors: Arc<dyn VectorStore> =
            Arc::new(FileVectorStore::open(&config.vector_path)?);
        let store = GraphStore::open_with_vector_store(&config.db_path, vectors)?;
        Ok(Self {
            config,
            store,
            analyser: ClassAnalyser::new(),
            summariser: None,
            embedder: None,
        })
    }

    pub fn with_summariser(mut self, provider: Arc<dyn Summariser>) -> Self {
        let mut summariser = ParallelSummariser::new(provider)
            .with_concurrency(self.config.summary_concurrency)
            .with_retry(self.config.retry_config());
        if let Some(embedder) = &self.embedder {
            summariser = summariser.with_embedder(embedder.clone());
        }
        self.summariser = Some(summariser);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder.clone());
        if let Some(summariser) = self.summariser.take() {
            self.summariser = Some(summariser.with_embedder(embedder));
        }
        self
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// One-shot extraction of every classfile under the configured root
    /// into the serving database (no shadow, no swap).
    pub fn extract_project(&self) -> Result<ExtractReport, EngineError> {
        let files = collect_classfiles(&self.config.classes_root)?;
        let report = extract_files(&self.store, &self.analyser, &files, &|| false)?;
        tracing::info!(
            target = "minerva.engine",
            files = report.files_processed,
            symbols = report.symbols_written,
            edges = report.edges_written,
            failures = report.failures.len(),
            "project extraction finished"
        );
        Ok(report)
    }

    /// Full shadow rebuild with integrity gating and the three-way swap,
    /// then anti-pattern detection and a backup retention sweep.
    pub fn rebuild_full(
        &self,
        should_cancel: &dyn Fn() -> bool,
    ) -> Result<RebuildOutcome, EngineError> {
        let files = collect_classfiles(&self.config.classes_root)?;
        let outcome = ShadowRebuilder::new(&self.store, &self.analyser)
            .with_thresholds(self.config.integrity_thresholds())
            .rebuild(&files, should_cancel)?;
        rules::detect_anti_patterns(&self.store)?;
        sweep_backups(&self.config.db_path, self.config.backup_retention());
        Ok(outcome)
    }

    /// Incremental rebuild. `changed_files` of `None` means detect by
    /// content hash against the index.
    pub fn rebuild_incremental(
        &self,
        changed_files: Option<Vec<PathBuf>>,
        cancel: &CancellationToken,
    ) -> Result<IncrementalReport, EngineError> {
        let mut coordinator = IncrementalCoordinator::new(&self.store, &self.analyser);
        if let Some(summariser) = &self.summariser {
            coordinator = coordinator.with_summariser(summariser);
        }
        let report = match changed_files {
            Some(paths) => {
                let detector = minerva_rebuild::ExplicitChanges::new(paths);
                coordinator.rebuild_detected(&detector, &self.config.classes_root, cancel)?
            }
            None => {
                let detector = minerva_rebuild::ContentHashDetector;
                coordinator.rebuild_detected(&detector, &self.config.classes_root, cancel)?
            }
        };
        if report.changed_files > 0 || report.deleted_files > 0 {
            rules::detect_anti_patterns(&self.store)?;
        }
        Ok(report)
    }

    /// Re-summarise everything currently flagged stale.
    pub fn summarise_stale(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<SummariseReport>, EngineError> {
        let Some(summariser) = &self.summariser else {
            return Ok(None);
        };
        let targets = self.store.stale_summary_targets()?;
        Ok(Some(summariser.summarise(&self.store, &targets, cancel, None)))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_symbol(&self, fqn: &str) -> Result<Option<SymbolRecord>, EngineError> {
        Ok(self.store.get_symbol(fqn)?)
    }

    /// Semantic search over summary embeddings when an embedder is
    /// configured, with a name-substring fallback otherwise.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        if let (Some(embedder), Some(vectors)) = (&self.embedder, self.store.vector_store()) {
            let embedding = embedder.embed(query)?;
            let matches = vectors.search(&embedding, k)?;
            let mut hits = Vec::with_capacity(matches.len());
            for m in matches {
                let Some(fqn) = self.store.summary_target_for_vector(&m.id)? else {
                    continue;
                };
                let summary = [SummaryLevel::Method, SummaryLevel::Class]
                    .iter()
                    .find_map(|level| {
                        self.store
                            .get_summary(&fqn, *level)
                            .ok()
                            .flatten()
                            .map(|s| s.summary)
                    });
                hits.push(SearchHit {
                    fqn,
                    score: m.score,
                    summary,
                });
            }
            if !hits.is_empty() {
                return Ok(hits);
            }
        }

        Ok(self
            .store
            .find_symbols_like(query, k)?
            .into_iter()
            .map(|symbol| SearchHit {
                fqn: symbol.fqn,
                score: 0.0,
                summary: None,
            })
            .collect())
    }

    pub fn impact(&self, fqn: &str, depth: Option<u32>) -> Result<Vec<TraversalHit>, EngineError> {
        Ok(self
            .store
            .impact(fqn, depth.unwrap_or(self.config.traversal_depth))?)
    }

    pub fn call_chain(
        &self,
        fqn: &str,
        depth: Option<u32>,
    ) -> Result<Vec<TraversalHit>, EngineError> {
        Ok(self
            .store
            .call_chain(fqn, depth.unwrap_or(self.config.traversal_depth))?)
    }

    pub fn list_entry_points(
        &self,
        filter: Option<EntryPointKind>,
    ) -> Result<Vec<EntryPointRecord>, EngineError> {
        Ok(self.store.list_entry_points(filter)?)
    }

    pub fn coverage(&self, fqn: &str) -> Result<CoverageReport, EngineError> {
        Ok(self.store.coverage(
            fqn,
            self.config.traversal_depth,
            &self.config.test_path_patterns,
        )?)
    }

    pub fn get_test_mapping(&self, fqn: &str) -> Result<Vec<TraversalHit>, EngineError> {
        Ok(self.store.test_mapping(
            fqn,
            self.config.traversal_depth,
            &self.config.test_path_patterns,
        )?)
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub fn enqueue_job(&self, kind: &str, payload: &[u8]) -> Result<JobRecord, EngineError> {
        Ok(self.store.enqueue_job(kind, payload)?)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, EngineError> {
        Ok(self.store.get_job(job_id)?)
    }

    pub fn list_jobs(&self, filter: Option<JobStatus>) -> Result<Vec<JobRecord>, EngineError> {
        Ok(self.store.list_jobs(filter)?)
    }

    pub fn cancel_job(&self, job_id: &str) -> Result<bool, EngineError> {
        Ok(self.store.cancel_job(job_id)?)
    }

    /// Acquire and execute one pending rebuild job, recording the terminal
    /// status. Cancellation set through the queue is honored between major
    /// phases.
    pub fn run_job(&self, job_id: &str) -> Result<JobStatus, EngineError> {
        let Some(job) = self.store.acquire_job(job_id)? else {
            return Err(EngineError::JobUnavailable {
                job_id: job_id.to_string(),
            });
        };

        let result: Result<(), EngineError> = match job.kind.as_str() {
            JOB_REBUILD_FULL => {
                let store = &self.store;
                let id = job.job_id.clone();
                self.rebuild_full(&move || store.job_cancelled(&id).unwrap_or(false))
                    .map(|_| ())
            }
            JOB_REBUILD_INCREMENTAL => {
                let cancel = CancellationToken::new();
                let changed: Option<Vec<PathBuf>> = serde_json::from_slice(&job.payload).ok();
                self.rebuild_incremental(changed, &cancel).map(|_| ())
            }
            other => Err(EngineError::UnknownJobKind {
                job_id: job.job_id.clone(),
                kind: other.to_string(),
            }),
        };

        // A cancellation that fired mid-run already moved the row to its
        // terminal state; leave it be.
        if self.store.job_cancelled(&job.job_id)? {
            return Ok(JobStatus::Cancelled);
        }
        match result {
            Ok(()) => {
                self.store.complete_job(&job.job_id, None)?;
                Ok(JobStatus::Succeeded)
            }
            Err(err) => {
                self.store.complete_job(&job.job_id, Some(&err.to_string()))?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Run the built-in anti-pattern rules on demand.
    pub fn detect_anti_patterns(&self) -> Result<usize, EngineError> {
        rules::detect_anti_patterns(&self.store)
    }
}
