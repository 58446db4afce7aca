use parking_lot::Mutex;

/// Shared run counters. All mutation happens under the mutex; readers take a
/// snapshot copy rather than holding the lock.
#[derive(Debug, Default)]
pub struct SummariserStats {
    inner: Mutex<StatsSnapshot>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub cached: usize,
}

impl SummariserStats {
    pub fn record_total(&self, count: usize) {
        self.inner.lock().total += count;
    }

    pub fn record_success(&self) {
        self.inner.lock().success += 1;
    }

    pub fn record_failure(&self) {
        self.inner.lock().failed += 1;
    }

    pub fn record_cached(&self) {
        self.inner.lock().cached += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }
}

/// Rough cost accounting for LLM traffic, in characters (providers bill by
/// token; characters are the provider-independent proxy the caller can
/// convert).
#[derive(Debug, Default)]
pub struct CostTracker {
    inner: Mutex<CostSnapshot>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CostSnapshot {
    pub llm_calls: usize,
    pub prompt_chars: u64,
    pub completion_chars: u64,
}

impl CostTracker {
    pub fn record_call(&self, prompt: &str, completion: &str) {
        let mut inner = self.inner.lock();
        inner.llm_calls += 1;
        inner.prompt_chars += prompt.chars().count() as u64;
        inner.completion_chars += completion.chars().count() as u64;
    }

    pub fn snapshot(&self) -> CostSnapshot {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_copies() {
        let stats = SummariserStats::default();
        stats.record_total(2);
        stats.record_success();
        let snap = stats.snapshot();
        stats.record_failure();
        assert_eq!(snap.success, 1);
        assert_eq!(snap.failed, 0);
        assert_eq!(stats.snapshot().failed, 1);
    }
}
