//! Dual-store consistency suite: upsert semantics, cascade behavior, the
//! two-phase vector protocol, and orphan reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use minerva_model::{SummaryLevel, SymbolKind, SymbolRecord};
use minerva_store::{GraphStore, StoreError, SummaryWrite, SummaryWriteOutcome};
use minerva_vector::{FileVectorStore, VectorError, VectorMatch, VectorMetadata, VectorStore};

fn symbol(fqn: &str, kind: SymbolKind) -> SymbolRecord {
    let mut s = SymbolRecord::new(fqn, kind);
    s.file_path = "com/test/Fixture.class".to_string();
    s
}

fn open_store(dir: &tempfile::TempDir) -> GraphStore {
    GraphStore::open(dir.path().join("graph.db")).unwrap()
}

fn open_store_with_vectors(dir: &tempfile::TempDir) -> (GraphStore, Arc<FileVectorStore>) {
    let vectors = Arc::new(FileVectorStore::open(dir.path().join("vectors.bin")).unwrap());
    let store =
        GraphStore::open_with_vector_store(dir.path().join("graph.db"), vectors.clone()).unwrap();
    (store, vectors)
}

/// Vector store wrapper that can be switched to fail deletes, for forcing
/// the rollback-tracking path.
struct FailingDeletes<S> {
    inner: S,
    fail_deletes: AtomicBool,
}

impl<S> FailingDeletes<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl<S: VectorStore> VectorStore for FailingDeletes<S> {
    fn add(&self, id: &str, embedding: &[f32], metadata: VectorMetadata) -> minerva_vector::Result<()> {
        self.inner.add(id, embedding, metadata)
    }

    fn delete(&self, id: &str) -> minerva_vector::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(VectorError::Provider("injected delete failure".into()));
        }
        self.inner.delete(id)
    }

    fn contains(&self, id: &str) -> minerva_vector::Result<bool> {
        self.inner.contains(id)
    }

    fn ids(&self) -> minerva_vector::Result<Vec<String>> {
        self.inner.ids()
    }

    fn search(&self, query: &[f32], k: usize) -> minerva_vector::Result<Vec<VectorMatch>> {
        self.inner.search(query, k)
    }

    fn len(&self) -> minerva_vector::Result<usize> {
        self.inner.len()
    }
}

#[test]
fn upsert_is_idempotent_on_fqn() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut a = symbol("com.test.A", SymbolKind::Class);
    store.upsert_symbols(std::slice::from_ref(&a)).unwrap();
    a.line_number = 7;
    store.upsert_symbols(std::slice::from_ref(&a)).unwrap();
    store.upsert_symbols(&[a]).unwrap();

    assert_eq!(store.symbol_count().unwrap(), 1);
    assert_eq!(store.get_symbol("com.test.A").unwrap().unwrap().line_number, 7);
}

#[test]
fn kind_transition_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Class)])
        .unwrap();
    let err = store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Interface)])
        .unwrap_err();
    assert!(matches!(err, StoreError::KindTransition { .. }));
    // The failed batch rolled back entirely.
    assert_eq!(
        store.get_symbol("com.test.A").unwrap().unwrap().kind,
        SymbolKind::Class
    );
}

#[test]
fn reupsert_preserves_summaries() {
    // The delete-then-insert idiom would cascade the summary away; the
    // conflict-update upsert must not.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    store
        .upsert_symbols(&[symbol("com.test.S", SymbolKind::Class)])
        .unwrap();
    store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.S".into(),
            level: SummaryLevel::Class,
            summary: "a service".into(),
            embedding: None,
        })
        .unwrap();

    let mut updated = symbol("com.test.S", SymbolKind::Class);
    updated.line_number = 99;
    store.upsert_symbols(&[updated]).unwrap();

    let summary = store
        .get_summary("com.test.S", SummaryLevel::Class)
        .unwrap()
        .expect("summary survives re-upsert");
    assert_eq!(summary.summary, "a service");
    assert_eq!(
        store.get_symbol("com.test.S").unwrap().unwrap().line_number,
        99
    );
}

#[test]
fn deleting_symbol_cascades_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_store_with_vectors(&dir);

    store
        .upsert_symbols(&[
            symbol("com.test.A", SymbolKind::Class),
            symbol("com.test.A.run()", SymbolKind::Method),
            symbol("com.test.B", SymbolKind::Class),
        ])
        .unwrap();
    // Method is a child of the class.
    let mut method = symbol("com.test.A.run()", SymbolKind::Method);
    method.parent_fqn = Some("com.test.A".into());
    store.upsert_symbols(&[method]).unwrap();

    store
        .insert_edges(&[minerva_model::EdgeRecord::new(
            "com.test.A.run()",
            "com.test.B",
            minerva_model::EdgeRelation::Calls,
            "invokevirtual",
        )])
        .unwrap();
    store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.A.run()".into(),
            level: SummaryLevel::Method,
            summary: "runs".into(),
            embedding: Some(vec![1.0, 0.0]),
        })
        .unwrap();
    assert_eq!(vectors.len().unwrap(), 1);

    assert!(store.delete_symbol("com.test.A").unwrap());

    // Child symbol, its edge, its summary, and its vector are all gone.
    assert!(store.get_symbol("com.test.A.run()").unwrap().is_none());
    assert_eq!(store.edge_count().unwrap(), 0);
    assert!(store
        .get_summary("com.test.A.run()", SummaryLevel::Method)
        .unwrap()
        .is_none());
    assert_eq!(vectors.len().unwrap(), 0);
    assert_eq!(store.orphan_edge_count().unwrap(), 0);
}

#[test]
fn edges_to_unindexed_endpoints_are_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Class)])
        .unwrap();

    let report = store
        .insert_edges(&[
            minerva_model::EdgeRecord::new(
                "com.test.A",
                "java.lang.System.currentTimeMillis()",
                minerva_model::EdgeRelation::Calls,
                "invokestatic",
            ),
            minerva_model::EdgeRecord::new(
                "com.test.A",
                "com.test.A",
                minerva_model::EdgeRelation::Calls,
                "invokevirtual",
            ),
        ])
        .unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped_missing_endpoint, 1);
}

#[test]
fn mark_stale_returns_true_affected_count_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    for fqn in ["com.test.A", "com.test.B", "com.test.C"] {
        store.upsert_symbols(&[symbol(fqn, SymbolKind::Class)]).unwrap();
    }
    for fqn in ["com.test.A", "com.test.B"] {
        store
            .create_summary_with_vector(&SummaryWrite {
                target_fqn: fqn.into(),
                level: SummaryLevel::Class,
                summary: format!("summary of {fqn}"),
                embedding: None,
            })
            .unwrap();
    }

    let fqns: Vec<String> = ["com.test.A", "com.test.B", "com.test.C", "com.test.Missing"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    // Only A and B have summaries.
    assert_eq!(store.mark_stale(&fqns).unwrap(), 2);
    // Second run: same count, not zero: the update is not gated on the
    // current flag value.
    assert_eq!(store.mark_stale(&fqns).unwrap(), 2);
    assert_eq!(store.stale_count().unwrap(), 2);
}

#[test]
fn successful_dual_write_binds_vector() {
    // Invariant: after a successful create, the row exists and its vector_id
    // resolves in the vector store.
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_store_with_vectors(&dir);
    store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Class)])
        .unwrap();

    let outcome = store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.A".into(),
            level: SummaryLevel::Class,
            summary: "a class".into(),
            embedding: Some(vec![0.7, 0.3]),
        })
        .unwrap();
    let SummaryWriteOutcome::Written { vector_id: Some(vector_id) } = outcome else {
        panic!("expected written outcome with vector id, got {outcome:?}");
    };
    assert!(vectors.contains(&vector_id).unwrap());
    assert_eq!(
        store
            .get_summary("com.test.A", SummaryLevel::Class)
            .unwrap()
            .unwrap()
            .vector_id
            .as_deref(),
        Some(vector_id.as_str())
    );
}

#[test]
fn failed_relational_write_compensates_vector() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_store_with_vectors(&dir);

    // No symbol row: the summaries FK makes the relational phase fail.
    let err = store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.Ghost".into(),
            level: SummaryLevel::Class,
            summary: "never lands".into(),
            embedding: Some(vec![1.0, 0.0]),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Sql(_)));
    // The pre-written vector was compensated away.
    assert_eq!(vectors.len().unwrap(), 0);
    assert!(store.pending_vectors().unwrap().is_empty());
}

#[test]
fn rollback_with_failing_delete_records_pending_vector() {
    // Forced step-2 failure plus a failing compensating delete must leave
    // exactly one tracked orphan, written through a separate connection.
    let dir = tempfile::tempdir().unwrap();
    let inner = FileVectorStore::open(dir.path().join("vectors.bin")).unwrap();
    let flaky = Arc::new(FailingDeletes::new(inner));
    let store =
        GraphStore::open_with_vector_store(dir.path().join("graph.db"), flaky.clone()).unwrap();

    flaky.fail_deletes.store(true, Ordering::SeqCst);
    let err = store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.Ghost".into(),
            level: SummaryLevel::Class,
            summary: "never lands".into(),
            embedding: Some(vec![1.0, 0.0]),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Sql(_)));

    let pending = store.pending_vectors().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].target_fqn, "com.test.Ghost");
    assert_eq!(pending[0].reason, "rollback_failed");
    // The orphaned embedding is still in the vector store, held by the
    // injected failure.
    assert_eq!(flaky.len().unwrap(), 1);

    // Once deletes heal, reconciliation clears the orphan.
    flaky.fail_deletes.store(false, Ordering::SeqCst);
    let cleared = store.reconcile_vectors(Duration::ZERO).unwrap();
    assert_eq!(cleared, 1);
    assert!(store.pending_vectors().unwrap().is_empty());
    assert_eq!(flaky.len().unwrap(), 0);
}

#[test]
fn stale_recheck_skips_when_flag_already_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_store_with_vectors(&dir);
    store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Class)])
        .unwrap();

    // Fresh summary, not stale.
    store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.A".into(),
            level: SummaryLevel::Class,
            summary: "current".into(),
            embedding: Some(vec![0.1, 0.9]),
        })
        .unwrap();
    let baseline_vectors = vectors.len().unwrap();

    // A conditional writer racing after someone else already refreshed the
    // summary must skip and clean up its own vector.
    let outcome = store
        .write_summary_if_stale(&SummaryWrite {
            target_fqn: "com.test.A".into(),
            level: SummaryLevel::Class,
            summary: "late duplicate".into(),
            embedding: Some(vec![0.2, 0.8]),
        })
        .unwrap();
    assert_eq!(outcome, SummaryWriteOutcome::SkippedNotStale);
    assert_eq!(
        store
            .get_summary("com.test.A", SummaryLevel::Class)
            .unwrap()
            .unwrap()
            .summary,
        "current"
    );
    assert_eq!(vectors.len().unwrap(), baseline_vectors);

    // Once the summary is stale the conditional write goes through.
    store.mark_stale(&["com.test.A".to_string()]).unwrap();
    let outcome = store
        .write_summary_if_stale(&SummaryWrite {
            target_fqn: "com.test.A".into(),
            level: SummaryLevel::Class,
            summary: "refreshed".into(),
            embedding: Some(vec![0.3, 0.7]),
        })
        .unwrap();
    assert!(matches!(outcome, SummaryWriteOutcome::Written { .. }));
    let summary = store
        .get_summary("com.test.A", SummaryLevel::Class)
        .unwrap()
        .unwrap();
    assert_eq!(summary.summary, "refreshed");
    assert!(!summary.is_stale);
    // The replaced vector was deleted; only the new binding remains.
    assert_eq!(vectors.len().unwrap(), baseline_vectors);
}

#[test]
fn detect_orphans_reports_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_store_with_vectors(&dir);
    store
        .upsert_symbols(&[symbol("com.test.A", SymbolKind::Class)])
        .unwrap();
    store
        .create_summary_with_vector(&SummaryWrite {
            target_fqn: "com.test.A".into(),
            level: SummaryLevel::Class,
            summary: "bound".into(),
            embedding: Some(vec![1.0, 0.0]),
        })
        .unwrap();

    // A vector nothing references.
    vectors
        .add("dangling-id", &[0.0, 1.0], VectorMetadata::new())
        .unwrap();

    let report = store.detect_orphans().unwrap();
    assert_eq!(report.dangling_vectors, vec!["dangling-id".to_string()]);
    assert!(report.missing_vectors.is_empty());
}
