use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::SummariseError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    fn backoff_for(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16) as u32);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `f`, retrying transient failures with exponential backoff. The token
/// is checked before every attempt and instead of sleeping out a backoff
/// after cancellation.
pub(crate) fn run_with_retry<T>(
    retry: &RetryConfig,
    cancel: &CancellationToken,
    mut f: impl FnMut() -> Result<T, SummariseError>,
) -> Result<T, SummariseError> {
    let mut attempt = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(SummariseError::Cancelled);
        }
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                let delay = retry.backoff_for(attempt);
                tracing::debug!(
                    target = "minerva.summarise",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; backing off"
                );
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn transient_errors_are_retried_until_budget() {
        let calls = AtomicUsize::new(0);
        let retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let result = run_with_retry(&retry, &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(SummariseError::Transient("rate limited".into()))
        });
        assert!(matches!(result, Err(SummariseError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result = run_with_retry(&RetryConfig::default(), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(SummariseError::Fatal("bad auth".into()))
        });
        assert!(matches!(result, Err(SummariseError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_with_retry(&RetryConfig::default(), &cancel, || Ok::<_, SummariseError>(1));
        assert!(matches!(result, Err(SummariseError::Cancelled)));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
        assert_eq!(retry.backoff_for(8), Duration::from_millis(350));
    }
}
