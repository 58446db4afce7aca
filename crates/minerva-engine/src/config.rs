use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Serving relational database file. Rebuild siblings (`.new.<ts>`,
    /// `.tmp_swap`, `.backup.<ts>`) are created next to it.
    pub db_path: PathBuf,

    /// Vector snapshot file.
    pub vector_path: PathBuf,

    /// Root of the compiled classes tree to index.
    pub classes_root: PathBuf,

    /// Summariser worker pool size.
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,

    /// Transient-LLM-error retry budget.
    #[serde(default = "default_max_retries")]
    pub llm_max_retries: usize,

    #[serde(default = "default_initial_backoff_ms")]
    pub llm_initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub llm_max_backoff_ms: u64,

    /// A full rebuild producing fewer symbols than this floor is rejected.
    #[serde(default = "default_min_symbols")]
    pub integrity_min_symbols: u64,

    /// Reject a rebuild when more than this share of summaries is stale.
    #[serde(default = "default_max_stale_ratio")]
    pub integrity_max_stale_ratio: f64,

    /// How long retired `.backup.<ts>` files are kept before the sweep
    /// removes them.
    #[serde(default = "default_backup_retention_secs")]
    pub backup_retention_secs: u64,

    /// Default depth for impact/call-chain/coverage traversals.
    #[serde(default = "default_traversal_depth")]
    pub traversal_depth: u32,

    /// SQL LIKE patterns over `file_path` that classify a symbol as test
    /// code. Entirely caller-overridable; nothing else decides what a test
    /// is.
    #[serde(default = "default_test_path_patterns")]
    pub test_path_patterns: Vec<String>,
}

impl EngineConfig {
    /// Config rooted in `dir`, with every tunable at its default.
    pub fn at(dir: &std::path::Path) -> Self {
        Self {
            db_path: dir.join("graph.db"),
            vector_path: dir.join("vectors.bin"),
            classes_root: dir.join("classes"),
            summary_concurrency: default_summary_concurrency(),
            llm_max_retries: default_max_retries(),
            llm_initial_backoff_ms: default_initial_backoff_ms(),
            llm_max_backoff_ms: default_max_backoff_ms(),
            integrity_min_symbols: default_min_symbols(),
            integrity_max_stale_ratio: default_max_stale_ratio(),
            backup_retention_secs: default_backup_retention_secs(),
            traversal_depth: default_traversal_depth(),
            test_path_patterns: default_test_path_patterns(),
        }
    }

    pub fn backup_retention(&self) -> Duration {
        Duration::from_secs(self.backup_retention_secs)
    }

    pub fn retry_config(&self) -> minerva_ai::RetryConfig {
        minerva_ai::RetryConfig {
            max_retries: self.llm_max_retries,
            initial_backoff: Duration::from_millis(self.llm_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.llm_max_backoff_ms),
        }
    }

    pub fn integrity_thresholds(&self) -> minerva_rebuild::IntegrityThresholds {
        minerva_rebuild::IntegrityThresholds {
            min_symbols: self.integrity_min_symbols,
            max_stale_ratio: self.integrity_max_stale_ratio,
        }
    }
}

fn default_summary_concurrency() -> usize {
    10
}

fn default_max_retries() -> usize {
    2
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_min_symbols() -> u64 {
    1
}

fn default_max_stale_ratio() -> f64 {
    1.0
}

fn default_backup_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_traversal_depth() -> u32 {
    5
}

fn default_test_path_patterns() -> Vec<String> {
    vec![
        "%/test/%".to_string(),
        "%/test-classes/%".to_string(),
        "%Test.class".to_string(),
        "%Tests.class".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let json = r#"{
            "db_path": "/data/graph.db",
            "vector_path": "/data/vectors.bin",
            "classes_root": "/data/classes"
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.summary_concurrency, 10);
        assert_eq!(config.traversal_depth, 5);
        assert!(config
            .test_path_patterns
            .contains(&"%/test-classes/%".to_string()));
    }
}
