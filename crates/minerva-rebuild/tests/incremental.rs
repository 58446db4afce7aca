//! Incremental coordination: change detection, affected-set staleness,
//! re-extraction, and stale-aware re-summarisation.

use std::path::Path;
use std::sync::Arc;

use minerva_ai::{CancellationToken, ParallelSummariser, SummariseError, Summariser, SummaryOptions};
use minerva_analyzer::ClassAnalyser;
use minerva_model::{SummaryLevel, SymbolKind};
use minerva_rebuild::{
    extract_files, ChangeDetector, ChangeSet, ContentHashDetector, IncrementalCoordinator,
};
use minerva_store::GraphStore;
use minerva_test_fixtures::{class, code, method};

struct CannedSummariser;

impl Summariser for CannedSummariser {
    fn generate(&self, prompt: &str, _options: &SummaryOptions) -> Result<String, SummariseError> {
        let fqn = prompt
            .lines()
            .find_map(|line| line.strip_prefix("FQN: "))
            .unwrap_or("unknown");
        Ok(format!("describes {fqn}"))
    }
}

fn write_service(dir: &Path, line: u16) {
    let pkg = dir.join("com/shop");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(
        pkg.join("OrderService.class"),
        class("com.shop.OrderService")
            .method(method("place", "()V").code(
                code()
                    .line(line)
                    .invoke_virtual("com/shop/OrderRepository", "save", "()V"),
            ))
            .build(),
    )
    .unwrap();
}

fn write_repository(dir: &Path) {
    let pkg = dir.join("com/shop");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(
        pkg.join("OrderRepository.class"),
        class("com.shop.OrderRepository")
            .method(method("save", "()V").code(code().line(5).ret()))
            .build(),
    )
    .unwrap();
}

fn seed(dir: &Path, store: &GraphStore) {
    write_service(dir, 10);
    write_repository(dir);
    let files = minerva_rebuild::collect_classfiles(dir).unwrap();
    extract_files(store, &ClassAnalyser::new(), &files, &|| false).unwrap();
}

#[test]
fn empty_change_set_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    let analyser = ClassAnalyser::new();

    let report = IncrementalCoordinator::new(&store, &analyser)
        .rebuild(ChangeSet::default(), &CancellationToken::new())
        .unwrap();
    assert_eq!(report.changed_files, 0);
    assert_eq!(report.marked_stale, 0);
    assert!(report.affected_fqns.is_empty());
}

#[test]
fn content_hash_detector_sees_changed_and_deleted_files() {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("classes");
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    seed(&classes, &store);

    // Untouched tree: nothing to do.
    let detected = ContentHashDetector
        .detect(&store, &classes)
        .unwrap();
    assert!(detected.is_empty());

    // Touch one file, delete the other.
    write_service(&classes, 99);
    let repo_path = classes.join("com/shop/OrderRepository.class");
    std::fs::remove_file(&repo_path).unwrap();

    let detected = ContentHashDetector.detect(&store, &classes).unwrap();
    assert_eq!(detected.changed.len(), 1);
    assert!(detected.changed[0].ends_with("OrderService.class"));
    assert_eq!(detected.deleted.len(), 1);
    assert!(detected.deleted[0].ends_with("OrderRepository.class"));
}

#[test]
fn changed_file_marks_dependents_and_parents_stale() {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("classes");
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    let analyser = ClassAnalyser::new();
    seed(&classes, &store);

    // Summaries exist for the repository method and its caller.
    for (fqn, level) in [
        ("com.shop.OrderRepository.save()", SummaryLevel::Method),
        ("com.shop.OrderService.place()", SummaryLevel::Method),
        ("com.shop.OrderRepository", SummaryLevel::Class),
    ] {
        store
            .create_summary_with_vector(&minerva_store::SummaryWrite {
                target_fqn: fqn.into(),
                level,
                summary: format!("old summary of {fqn}"),
                embedding: None,
            })
            .unwrap();
    }

    // The repository's bytecode changes.
    std::fs::write(
        classes.join("com/shop/OrderRepository.class"),
        class("com.shop.OrderRepository")
            .method(method("save", "()V").code(code().line(50).ret()))
            .method(method("delete", "()V").code(code().ret()))
            .build(),
    )
    .unwrap();

    let coordinator = IncrementalCoordinator::new(&store, &analyser);
    let changes = ContentHashDetector.detect(&store, &classes).unwrap();
    let report = coordinator.rebuild(changes, &CancellationToken::new()).unwrap();

    // Affected covers the repository symbols, the calling method (1-hop
    // dependent), and the parent class.
    assert!(report
        .affected_fqns
        .contains(&"com.shop.OrderRepository.save()".to_string()));
    assert!(report
        .affected_fqns
        .contains(&"com.shop.OrderService.place()".to_string()));
    assert!(report
        .affected_fqns
        .contains(&"com.shop.OrderRepository".to_string()));
    // All three existing summaries were marked stale in one transaction.
    assert_eq!(report.marked_stale, 3);

    // Re-extraction picked up the new method and the new line number.
    assert!(store
        .get_symbol("com.shop.OrderRepository.delete()")
        .unwrap()
        .is_some());
    assert_eq!(
        store
            .get_symbol("com.shop.OrderRepository.save()")
            .unwrap()
            .unwrap()
            .line_number,
        50
    );
}

#[test]
fn deleted_file_cascades_symbols_away() {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("classes");
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    let analyser = ClassAnalyser::new();
    seed(&classes, &store);
    assert!(store.get_symbol("com.shop.OrderRepository").unwrap().is_some());

    std::fs::remove_file(classes.join("com/shop/OrderRepository.class")).unwrap();
    let coordinator = IncrementalCoordinator::new(&store, &analyser);
    let changes = ContentHashDetector.detect(&store, &classes).unwrap();
    coordinator.rebuild(changes, &CancellationToken::new()).unwrap();

    assert!(store.get_symbol("com.shop.OrderRepository").unwrap().is_none());
    assert!(store
        .get_symbol("com.shop.OrderRepository.save()")
        .unwrap()
        .is_none());
    // The dangling call edge went with it.
    assert!(store
        .call_chain("com.shop.OrderService.place()", 3)
        .unwrap()
        .is_empty());
    // And the detector no longer reports the file as deleted.
    let detected = ContentHashDetector.detect(&store, &classes).unwrap();
    assert!(detected.deleted.is_empty());
}

#[test]
fn resummarisation_refreshes_stale_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("classes");
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    let analyser = ClassAnalyser::new();
    seed(&classes, &store);

    store
        .create_summary_with_vector(&minerva_store::SummaryWrite {
            target_fqn: "com.shop.OrderService.place()".into(),
            level: SummaryLevel::Method,
            summary: "stale description".into(),
            embedding: None,
        })
        .unwrap();

    write_service(&classes, 77);
    let summariser = ParallelSummariser::new(Arc::new(CannedSummariser)).with_concurrency(2);
    let coordinator =
        IncrementalCoordinator::new(&store, &analyser).with_summariser(&summariser);
    let changes = ContentHashDetector.detect(&store, &classes).unwrap();
    let report = coordinator.rebuild(changes, &CancellationToken::new()).unwrap();

    let summarise = report.summarise.expect("summarise phase ran");
    assert!(summarise.succeeded() >= 1);
    let refreshed = store
        .get_summary("com.shop.OrderService.place()", SummaryLevel::Method)
        .unwrap()
        .unwrap();
    assert!(!refreshed.is_stale);
    assert_eq!(refreshed.summary, "describes com.shop.OrderService.place()");

    let class_kind = store
        .get_symbol("com.shop.OrderService")
        .unwrap()
        .unwrap()
        .kind;
    assert_eq!(class_kind, SymbolKind::Class);
}
