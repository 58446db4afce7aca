//! Built-in anti-pattern rules: pure predicates over the finished graph.
//!
//! Rules read the store and emit `anti_patterns` rows; no rule DSL, no
//! source access.

use minerva_model::{now_millis, AntiPatternRecord, Severity};
use minerva_store::GraphStore;

use crate::error::EngineError;

pub const RULE_SELF_RECURSION: &str = "self-recursion";
pub const RULE_ENTRY_CALLS_ENTRY: &str = "entry-point-calls-entry-point";

/// Evaluate every built-in rule and persist the findings. Returns the number
/// of rows written.
pub fn detect_anti_patterns(store: &GraphStore) -> Result<usize, EngineError> {
    let now = now_millis();
    let mut findings: Vec<AntiPatternRecord> = Vec::new();

    for fqn in store.self_call_edges()? {
        findings.push(AntiPatternRecord {
            rule_id: RULE_SELF_RECURSION.to_string(),
            from_fqn: fqn.clone(),
            to_fqn: Some(fqn),
            severity: Severity::Warning,
            message: "method calls itself directly; verify the recursion terminates".to_string(),
            detected_at: now,
        });
    }

    for (from, to) in store.entry_point_call_edges()? {
        findings.push(AntiPatternRecord {
            rule_id: RULE_ENTRY_CALLS_ENTRY.to_string(),
            from_fqn: from.clone(),
            to_fqn: Some(to.clone()),
            severity: Severity::Info,
            message: format!(
                "entry point {from} invokes entry point {to}; external surfaces should not chain"
            ),
            detected_at: now,
        });
    }

    Ok(store.insert_anti_patterns(&findings)?)
}
