use thiserror::Error;

/// Summarisation failure taxonomy.
///
/// `Transient` (rate limits, connection loss, request timeouts) is retried
/// with backoff; `Fatal` (auth, quota, schema) is not.
#[derive(Debug, Clone, Error)]
pub enum SummariseError {
    #[error("transient LLM error: {0}")]
    Transient(String),

    #[error("fatal LLM error: {0}")]
    Fatal(String),

    #[error("summarisation cancelled")]
    Cancelled,
}

impl SummariseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SummariseError::Transient(_))
    }
}
