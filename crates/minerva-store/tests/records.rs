//! Batch summary writes, glossary/constraint dual-writes, and migration
//! preview.

use std::sync::Arc;

use minerva_model::{
    ConstraintRecord, GlossaryRecord, Severity, SummaryLevel, SymbolKind, SymbolRecord,
};
use minerva_store::{BatchMode, GraphStore, SummaryWrite};
use minerva_vector::{FileVectorStore, VectorStore};

fn symbol(fqn: &str) -> SymbolRecord {
    SymbolRecord::new(fqn, SymbolKind::Class)
}

fn open_with_vectors(dir: &tempfile::TempDir) -> (GraphStore, Arc<FileVectorStore>) {
    let vectors = Arc::new(FileVectorStore::open(dir.path().join("vectors.bin")).unwrap());
    let store =
        GraphStore::open_with_vector_store(dir.path().join("graph.db"), vectors.clone()).unwrap();
    (store, vectors)
}

fn write(fqn: &str, embedding: Option<Vec<f32>>) -> SummaryWrite {
    SummaryWrite {
        target_fqn: fqn.to_string(),
        level: SummaryLevel::Class,
        summary: format!("summary of {fqn}"),
        embedding,
    }
}

#[test]
fn batch_all_or_nothing_rolls_back_and_compensates() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_with_vectors(&dir);
    store.upsert_symbols(&[symbol("com.t.A")]).unwrap();

    // Second item references a missing symbol: the whole batch must vanish,
    // including phase-1 vectors.
    let writes = vec![
        write("com.t.A", Some(vec![1.0, 0.0])),
        write("com.t.Ghost", Some(vec![0.0, 1.0])),
    ];
    let err = store
        .batch_create_summaries(&writes, BatchMode::AllOrNothing)
        .unwrap_err();
    assert!(matches!(err, minerva_store::StoreError::Sql(_)));
    assert!(store
        .get_summary("com.t.A", SummaryLevel::Class)
        .unwrap()
        .is_none());
    assert_eq!(vectors.len().unwrap(), 0);
}

#[test]
fn batch_best_effort_reports_failures_and_keeps_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_with_vectors(&dir);
    store.upsert_symbols(&[symbol("com.t.A"), symbol("com.t.B")]).unwrap();

    let writes = vec![
        write("com.t.A", Some(vec![1.0, 0.0])),
        write("com.t.Ghost", Some(vec![0.0, 1.0])),
        write("com.t.B", None),
    ];
    let report = store
        .batch_create_summaries(&writes, BatchMode::BestEffort)
        .unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "com.t.Ghost");

    assert!(store
        .get_summary("com.t.A", SummaryLevel::Class)
        .unwrap()
        .is_some());
    assert!(store
        .get_summary("com.t.B", SummaryLevel::Class)
        .unwrap()
        .is_some());
    // Only the surviving item's vector remains.
    assert_eq!(vectors.len().unwrap(), 1);
}

#[test]
fn glossary_upsert_binds_and_replaces_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let (store, vectors) = open_with_vectors(&dir);
    store.upsert_symbols(&[symbol("com.t.Order")]).unwrap();

    let record = GlossaryRecord {
        code_term: "GMV".to_string(),
        business_meaning: "gross merchandise volume".to_string(),
        synonyms: vec!["gross volume".to_string()],
        source_fqn: Some("com.t.Order".to_string()),
        vector_id: None,
        created_at: 0,
    };
    let first = store.upsert_glossary(&record, Some(&[1.0, 0.0])).unwrap();
    let first = first.expect("vector bound");

    // Re-upserting replaces the binding and cleans the old vector.
    let second = store.upsert_glossary(&record, Some(&[0.0, 1.0])).unwrap();
    let second = second.expect("vector bound");
    assert_ne!(first, second);
    assert!(!vectors.contains(&first).unwrap());
    assert!(vectors.contains(&second).unwrap());

    let loaded = store.get_glossary("GMV").unwrap().unwrap();
    assert_eq!(loaded.synonyms, vec!["gross volume".to_string()]);
    assert_eq!(loaded.source_fqn.as_deref(), Some("com.t.Order"));

    // Deleting the source symbol nulls the reference, keeps the term.
    store.delete_symbol("com.t.Order").unwrap();
    let loaded = store.get_glossary("GMV").unwrap().unwrap();
    assert_eq!(loaded.source_fqn, None);
}

#[test]
fn constraint_upsert_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _vectors) = open_with_vectors(&dir);

    let record = ConstraintRecord {
        name: "orders-are-idempotent".to_string(),
        constraint_type: "invariant".to_string(),
        description: "replaying an order event must not duplicate rows".to_string(),
        source_fqn: None,
        severity: Severity::Error,
        vector_id: None,
    };
    store.upsert_constraint(&record, Some(&[0.5, 0.5])).unwrap();

    let loaded = store.get_constraint("orders-are-idempotent").unwrap().unwrap();
    assert_eq!(loaded.severity, Severity::Error);
    assert!(loaded.vector_id.is_some());
}

#[test]
fn migration_preview_is_readable_without_applying() {
    let dir = tempfile::tempdir().unwrap();
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    store.upsert_symbols(&[symbol("com.t.A")]).unwrap();
    drop(store);

    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).unwrap();
    let preview = minerva_store::preview_migration(&conn, 2).unwrap();
    assert_eq!(preview.affected.get("edges"), Some(&0));
    assert!(preview.is_empty());
}
