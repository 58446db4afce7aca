//! Impact / call-chain / coverage traversal over the `calls` subgraph.

use minerva_model::{EdgeRecord, EdgeRelation, SymbolKind, SymbolRecord};
use minerva_store::GraphStore;

fn open_store(dir: &tempfile::TempDir) -> GraphStore {
    GraphStore::open(dir.path().join("graph.db")).unwrap()
}

fn seed_chain(store: &GraphStore, chain: &[&str]) {
    let symbols: Vec<SymbolRecord> = chain
        .iter()
        .map(|fqn| {
            let mut s = SymbolRecord::new(*fqn, SymbolKind::Method);
            s.file_path = format!("{}.class", fqn.replace('.', "/"));
            s
        })
        .collect();
    store.upsert_symbols(&symbols).unwrap();

    let edges: Vec<EdgeRecord> = chain
        .windows(2)
        .map(|pair| EdgeRecord::new(pair[0], pair[1], EdgeRelation::Calls, "invokevirtual"))
        .collect();
    store.insert_edges(&edges).unwrap();
}

#[test]
fn impact_respects_depth() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    seed_chain(&store, &["com.t.A", "com.t.B", "com.t.C", "com.t.D"]);

    let shallow = store.impact("com.t.D", 2).unwrap();
    let got: Vec<(u32, &str)> = shallow.iter().map(|h| (h.depth, h.fqn.as_str())).collect();
    assert_eq!(got, vec![(0, "com.t.C"), (1, "com.t.B")]);

    let deep = store.impact("com.t.D", 5).unwrap();
    let got: Vec<(u32, &str)> = deep.iter().map(|h| (h.depth, h.fqn.as_str())).collect();
    assert_eq!(got, vec![(0, "com.t.C"), (1, "com.t.B"), (2, "com.t.A")]);
}

#[test]
fn call_chain_walks_forward() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    seed_chain(&store, &["com.t.A", "com.t.B", "com.t.C"]);

    let chain = store.call_chain("com.t.A", 5).unwrap();
    let got: Vec<(u32, &str)> = chain.iter().map(|h| (h.depth, h.fqn.as_str())).collect();
    assert_eq!(got, vec![(0, "com.t.B"), (1, "com.t.C")]);
}

#[test]
fn cycles_terminate_and_keep_shortest_depth() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    seed_chain(&store, &["com.t.A", "com.t.B", "com.t.A2"]);
    // Close the loop: A2 → A, and a shortcut A → A2.
    store
        .insert_edges(&[
            EdgeRecord::new("com.t.A2", "com.t.A", EdgeRelation::Calls, "invokevirtual"),
        ])
        .unwrap();

    let hits = store.impact("com.t.A", 10).unwrap();
    // Every caller appears exactly once despite the cycle.
    let mut fqns: Vec<&str> = hits.iter().map(|h| h.fqn.as_str()).collect();
    fqns.sort();
    fqns.dedup();
    assert_eq!(fqns.len(), hits.len());
    // A2 calls A directly: shortest depth 0 wins over the depth-2 path.
    let a2 = hits.iter().find(|h| h.fqn == "com.t.A2").unwrap();
    assert_eq!(a2.depth, 0);
}

#[test]
fn shared_caller_appears_once_per_target() {
    // c calls both a and b: it must show up once in each target's impact,
    // independently.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let symbols: Vec<SymbolRecord> = ["com.t.a", "com.t.b", "com.t.c"]
        .iter()
        .map(|f| SymbolRecord::new(*f, SymbolKind::Method))
        .collect();
    store.upsert_symbols(&symbols).unwrap();
    store
        .insert_edges(&[
            EdgeRecord::new("com.t.c", "com.t.a", EdgeRelation::Calls, "invokevirtual"),
            EdgeRecord::new("com.t.c", "com.t.b", EdgeRelation::Calls, "invokevirtual"),
        ])
        .unwrap();

    for target in ["com.t.a", "com.t.b"] {
        let hits = store.impact(target, 3).unwrap();
        assert_eq!(hits.len(), 1, "impact({target})");
        assert_eq!(hits[0].fqn, "com.t.c");
        assert_eq!(hits[0].depth, 0);
    }
}

#[test]
fn non_call_edges_do_not_join_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let symbols: Vec<SymbolRecord> = ["com.t.A", "com.t.B"]
        .iter()
        .map(|f| SymbolRecord::new(*f, SymbolKind::Class))
        .collect();
    store.upsert_symbols(&symbols).unwrap();
    store
        .insert_edges(&[EdgeRecord::new(
            "com.t.A",
            "com.t.B",
            EdgeRelation::Extends,
            "extends",
        )])
        .unwrap();

    assert!(store.impact("com.t.B", 5).unwrap().is_empty());
}

#[test]
fn coverage_classifies_test_callers_in_one_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut prod = SymbolRecord::new("com.t.Service.save()", SymbolKind::Method);
    prod.file_path = "build/classes/com/t/Service.class".into();
    let mut caller = SymbolRecord::new("com.t.Api.save()", SymbolKind::Method);
    caller.file_path = "build/classes/com/t/Api.class".into();
    let mut test = SymbolRecord::new("com.t.ServiceTest.saves()", SymbolKind::Method);
    test.file_path = "build/test-classes/com/t/ServiceTest.class".into();
    store.upsert_symbols(&[prod, caller, test]).unwrap();

    store
        .insert_edges(&[
            EdgeRecord::new(
                "com.t.Api.save()",
                "com.t.Service.save()",
                EdgeRelation::Calls,
                "invokevirtual",
            ),
            EdgeRecord::new(
                "com.t.ServiceTest.saves()",
                "com.t.Service.save()",
                EdgeRelation::Calls,
                "invokevirtual",
            ),
        ])
        .unwrap();

    let patterns = vec!["%/test-classes/%".to_string(), "%Test.class".to_string()];
    let report = store.coverage("com.t.Service.save()", 3, &patterns).unwrap();
    assert_eq!(report.test_caller_count, 1);
    assert_eq!(report.non_test_caller_count, 1);
    assert!(report.covered());

    let mapping = store
        .test_mapping("com.t.Service.save()", 3, &patterns)
        .unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping[0].fqn, "com.t.ServiceTest.saves()");
}
