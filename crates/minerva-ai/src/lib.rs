//! LLM summarisation with bounded concurrency.
//!
//! [`Summariser`] is the provider seam: the engine never talks to an LLM
//! directly. [`ParallelSummariser`] drives a worker pool over stale symbols,
//! with per-symbol caching, transient-error retry, thread-safe stats/cost
//! tracking, and cooperative cancellation between tasks and retries.

#![forbid(unsafe_code)]

mod cancel;
mod error;
mod parallel;
mod prompt;
mod retry;
mod stats;
mod summariser;

#[cfg(feature = "http-provider")]
mod http_provider;

pub use crate::cancel::CancellationToken;
pub use crate::error::SummariseError;
pub use crate::parallel::{ParallelSummariser, SummariseOutcome, SummariseReport};
pub use crate::prompt::assemble_prompt;
pub use crate::retry::RetryConfig;
pub use crate::stats::{CostSnapshot, CostTracker, StatsSnapshot, SummariserStats};
pub use crate::summariser::{SummaryOptions, Summariser};

#[cfg(feature = "http-provider")]
pub use crate::http_provider::OpenAiCompatibleSummariser;
