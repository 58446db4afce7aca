use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use minerva_model::{SummaryLevel, SymbolKind, SymbolRecord};
use minerva_store::{GraphStore, SummaryWrite, SummaryWriteOutcome};
use minerva_vector::Embedder;

use crate::cancel::CancellationToken;
use crate::prompt::assemble_prompt;
use crate::retry::{run_with_retry, RetryConfig};
use crate::stats::{CostTracker, SummariserStats};
use crate::summariser::{SummaryOptions, Summariser};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Per-fqn result of a summarisation run.
#[derive(Debug, Clone, PartialEq)]
pub enum SummariseOutcome {
    Ok(String),
    /// A fresh summary already existed; nothing was generated.
    Cached,
    /// The symbol is unknown or has no content to summarise.
    EmptyInput,
    LlmFailure(String),
    StoreFailure(String),
}

#[derive(Debug, Default)]
pub struct SummariseReport {
    /// Keyed by fqn; the caller makes no ordering assumption.
    pub outcomes: HashMap<String, SummariseOutcome>,
}

impl SummariseReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, SummariseOutcome::Ok(_)))
            .count()
    }
}

/// Bounded-concurrency summary generation over the graph store.
///
/// A worker pool of `concurrency` scoped threads drains a shared queue; each
/// task reads the symbol, assembles a prompt, calls the provider (with
/// transient-error retry), and writes through the store's dual-write path
/// with a stale re-check. Stats and cost are mutated under mutexes and read
/// as snapshots.
pub struct ParallelSummariser {
    summariser: Arc<dyn Summariser>,
    embedder: Option<Arc<dyn Embedder>>,
    options: SummaryOptions,
    retry: RetryConfig,
    concurrency: usize,
    stats: SummariserStats,
    cost: CostTracker,
}

impl ParallelSummariser {
    pub fn new(summariser: Arc<dyn Summariser>) -> Self {
        Self {
            summariser,
            embedder: None,
            options: SummaryOptions::default(),
            retry: RetryConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            stats: SummariserStats::default(),
            cost: CostTracker::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: SummaryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stats(&self) -> &SummariserStats {
        &self.stats
    }

    pub fn cost(&self) -> &CostTracker {
        &self.cost
    }

    /// Summarise `fqns` with bounded concurrency. Cancellation stops new
    /// task pickup; tasks already running complete and are recorded.
    pub fn summarise(
        &self,
        store: &GraphStore,
        fqns: &[String],
        cancel: &CancellationToken,
        on_progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> SummariseReport {
        if fqns.is_empty() {
            return SummariseReport::default();
        }
        self.stats.record_total(fqns.len());

        let queue: Mutex<VecDeque<String>> = Mutex::new(fqns.iter().cloned().collect());
        let outcomes: Mutex<HashMap<String, SummariseOutcome>> = Mutex::new(HashMap::new());
        let completed: Mutex<usize> = Mutex::new(0);
        let total = fqns.len();
        let workers = self.concurrency.min(total);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Some(fqn) = queue.lock().pop_front() else {
                        break;
                    };
                    let outcome = self.summarise_one(store, &fqn, cancel);
                    match &outcome {
                        SummariseOutcome::Ok(_) => self.stats.record_success(),
                        SummariseOutcome::Cached => self.stats.record_cached(),
                        _ => self.stats.record_failure(),
                    }
                    outcomes.lock().insert(fqn, outcome);
                    if let Some(on_progress) = on_progress {
                        let mut done = completed.lock();
                        *done += 1;
                        on_progress(*done, total);
                    }
                });
            }
        });

        SummariseReport {
            outcomes: outcomes.into_inner(),
        }
    }

    fn summarise_one(
        &self,
        store: &GraphStore,
        fqn: &str,
        cancel: &CancellationToken,
    ) -> SummariseOutcome {
        let symbol = match store.get_symbol(fqn) {
            Ok(Some(symbol)) => symbol,
            Ok(None) => return SummariseOutcome::EmptyInput,
            Err(err) => return SummariseOutcome::StoreFailure(err.to_string()),
        };
        let level = summary_level_for(&symbol);

        // Cache: a fresh summary short-circuits the provider call entirely.
        match store.get_summary(fqn, level) {
            Ok(Some(existing)) if !existing.is_stale => return SummariseOutcome::Cached,
            Ok(_) => {}
            Err(err) => return SummariseOutcome::StoreFailure(err.to_string()),
        }

        let prompt = assemble_prompt(store, &symbol);
        if prompt.trim().is_empty() {
            return SummariseOutcome::EmptyInput;
        }

        let generated = run_with_retry(&self.retry, cancel, || {
            self.summariser.generate(&prompt, &self.options)
        });
        let summary_text = match generated {
            Ok(text) => {
                self.cost.record_call(&prompt, &text);
                text
            }
            Err(err) => {
                tracing::warn!(
                    target = "minerva.summarise",
                    fqn,
                    error = %err,
                    "summary generation failed"
                );
                return SummariseOutcome::LlmFailure(err.to_string());
            }
        };

        // Embedding failures are the vector half's concern: the summary row
        // still commits, with vector_id NULL, and similarity search simply
        // does not see this symbol until a later refresh.
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(&summary_text) {
                Ok(vector) => Some(vector),
                Err(err) => {
                    tracing::warn!(
                        target = "minerva.summarise",
                        fqn,
                        error = %err,
                        "embedding failed; summary commits without vector"
                    );
                    None
                }
            },
            None => None,
        };

        let write = SummaryWrite {
            target_fqn: symbol.fqn.clone(),
            level,
            summary: summary_text.clone(),
            embedding,
        };
        match store.write_summary_if_stale(&write) {
            Ok(SummaryWriteOutcome::Written { .. }) => SummariseOutcome::Ok(summary_text),
            // Another writer refreshed the row between our cache check and
            // the conditional write; their result stands.
            Ok(SummaryWriteOutcome::SkippedNotStale) => SummariseOutcome::Cached,
            Err(err) => SummariseOutcome::StoreFailure(err.to_string()),
        }
    }
}

fn summary_level_for(symbol: &SymbolRecord) -> SummaryLevel {
    match symbol.kind {
        SymbolKind::Method | SymbolKind::Field => SummaryLevel::Method,
        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum => SummaryLevel::Class,
    }
}
