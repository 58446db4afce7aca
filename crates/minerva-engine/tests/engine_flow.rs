//! End-to-end: extract a synthetic project, rebuild, summarise, query.

use std::path::Path;
use std::sync::Arc;

use minerva_ai::{CancellationToken, SummariseError, Summariser, SummaryOptions};
use minerva_engine::{EngineConfig, EngineError, KnowledgeEngine, JOB_REBUILD_FULL};
use minerva_model::{EntryPointKind, JobStatus, SymbolKind};
use minerva_test_fixtures::{annotation, class, code, field, method};
use minerva_vector::HashEmbedder;

struct CannedSummariser;

impl Summariser for CannedSummariser {
    fn generate(&self, prompt: &str, _options: &SummaryOptions) -> Result<String, SummariseError> {
        let fqn = prompt
            .lines()
            .find_map(|line| line.strip_prefix("FQN: "))
            .unwrap_or("unknown");
        Ok(format!("handles {fqn}"))
    }
}

fn write_project(root: &Path) {
    let pkg = root.join("com/shop");
    std::fs::create_dir_all(&pkg).unwrap();

    std::fs::write(
        pkg.join("OrderController.class"),
        class("com.shop.OrderController")
            .annotate(annotation(
                "org.springframework.web.bind.annotation.RestController",
            ))
            .annotate(
                annotation("org.springframework.web.bind.annotation.RequestMapping")
                    .with_str_array("value", &["/api/orders"]),
            )
            .field(
                field("service", "Lcom/shop/OrderService;").annotate(annotation(
                    "org.springframework.beans.factory.annotation.Autowired",
                )),
            )
            .method(
                method("create", "()V")
                    .annotate(
                        annotation("org.springframework.web.bind.annotation.PostMapping")
                            .with_str_array("value", &["/create"]),
                    )
                    .code(code().line(20).invoke_virtual(
                        "com/shop/OrderService",
                        "place",
                        "()V",
                    )),
            )
            .build(),
    )
    .unwrap();

    std::fs::write(
        pkg.join("OrderService.class"),
        class("com.shop.OrderService")
            .annotate(annotation("org.springframework.stereotype.Service"))
            .method(
                method("place", "()V").code(code().line(30).invoke_virtual(
                    "com/shop/OrderRepository",
                    "save",
                    "()V",
                )),
            )
            .build(),
    )
    .unwrap();

    std::fs::write(
        pkg.join("OrderRepository.class"),
        class("com.shop.OrderRepository")
            .annotate(annotation("org.springframework.stereotype.Repository"))
            .method(method("save", "()V").code(code().line(40).ret()))
            .build(),
    )
    .unwrap();

    // A test class calling the service, under a test-classes path.
    let test_pkg = root.join("test-classes/com/shop");
    std::fs::create_dir_all(&test_pkg).unwrap();
    std::fs::write(
        test_pkg.join("OrderServiceTest.class"),
        class("com.shop.OrderServiceTest")
            .method(
                method("places", "()V").code(code().line(12).invoke_virtual(
                    "com/shop/OrderService",
                    "place",
                    "()V",
                )),
            )
            .build(),
    )
    .unwrap();
}

fn engine_at(dir: &tempfile::TempDir) -> KnowledgeEngine {
    let config = EngineConfig::at(dir.path());
    write_project(&config.classes_root);
    KnowledgeEngine::open(config)
        .unwrap()
        .with_embedder(Arc::new(HashEmbedder::new(64)))
        .with_summariser(Arc::new(CannedSummariser))
}

#[test]
fn extract_then_query_symbols_and_entry_points() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);

    let report = engine.extract_project().unwrap();
    assert!(report.failures.is_empty());
    assert!(report.symbols_written >= 8);

    let controller = engine
        .get_symbol("com.shop.OrderController")
        .unwrap()
        .expect("controller symbol");
    assert_eq!(controller.kind, SymbolKind::Class);
    assert_eq!(
        controller.attributes.get_str("spring_bean_name"),
        Some("orderController")
    );

    let http = engine
        .list_entry_points(Some(EntryPointKind::Http))
        .unwrap();
    assert_eq!(http.len(), 1);
    assert_eq!(http[0].symbol_fqn, "com.shop.OrderController.create()");
    assert_eq!(http[0].http_method.as_deref(), Some("POST"));
    assert_eq!(http[0].http_path.as_deref(), Some("/api/orders/create"));
}

#[test]
fn impact_and_coverage_walk_the_call_graph() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);
    engine.extract_project().unwrap();

    let impact = engine
        .impact("com.shop.OrderRepository.save()", None)
        .unwrap();
    let fqns: Vec<&str> = impact.iter().map(|h| h.fqn.as_str()).collect();
    assert_eq!(
        fqns,
        vec![
            "com.shop.OrderService.place()",
            "com.shop.OrderController.create()",
            "com.shop.OrderServiceTest.places()",
        ]
    );

    let coverage = engine.coverage("com.shop.OrderService.place()").unwrap();
    assert!(coverage.covered());
    assert_eq!(coverage.test_caller_count, 1);

    let mapping = engine
        .get_test_mapping("com.shop.OrderService.place()")
        .unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping[0].fqn, "com.shop.OrderServiceTest.places()");
}

#[test]
fn summarise_and_search_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);
    engine.extract_project().unwrap();

    let fqns = vec![
        "com.shop.OrderService".to_string(),
        "com.shop.OrderService.place()".to_string(),
    ];
    let summariser = minerva_ai::ParallelSummariser::new(Arc::new(CannedSummariser))
        .with_embedder(Arc::new(HashEmbedder::new(64)))
        .with_concurrency(2);
    let run = summariser.summarise(engine.store(), &fqns, &CancellationToken::new(), None);
    assert_eq!(run.succeeded(), 2);

    // Nothing is stale afterwards, so the stale-driven pass has no work.
    let report = engine
        .summarise_stale(&CancellationToken::new())
        .unwrap()
        .expect("summariser configured");
    assert!(report.outcomes.is_empty());

    let hits = engine.search("handles place order", 5).unwrap();
    assert!(!hits.is_empty());

    let err = engine.search("   ", 5).unwrap_err();
    assert!(matches!(err, EngineError::EmptyQuery));
}

#[test]
fn full_rebuild_job_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);

    let job = engine.enqueue_job(JOB_REBUILD_FULL, b"{}").unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let status = engine.run_job(&job.job_id).unwrap();
    assert_eq!(status, JobStatus::Succeeded);
    let finished = engine.get_job(&job.job_id).unwrap().unwrap();
    assert!(finished.finished_at.is_some());

    // The rebuilt database serves queries.
    assert!(engine
        .get_symbol("com.shop.OrderService.place()")
        .unwrap()
        .is_some());

    // Running the same job again is a conflict, not a rebuild.
    let err = engine.run_job(&job.job_id).unwrap_err();
    assert!(matches!(err, EngineError::JobUnavailable { .. }));
}

#[test]
fn cancelled_job_never_runs() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);

    let job = engine.enqueue_job(JOB_REBUILD_FULL, b"{}").unwrap();
    assert!(engine.cancel_job(&job.job_id).unwrap());
    let err = engine.run_job(&job.job_id).unwrap_err();
    assert!(matches!(err, EngineError::JobUnavailable { .. }));
    assert_eq!(engine.store().symbol_count().unwrap(), 0);
}

#[test]
fn incremental_noop_returns_zero_counts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(&dir);
    engine.extract_project().unwrap();

    let report = engine
        .rebuild_incremental(Some(Vec::new()), &CancellationToken::new())
        .unwrap();
    assert_eq!(report.changed_files, 0);
    assert_eq!(report.deleted_files, 0);
    assert_eq!(report.marked_stale, 0);
}

#[test]
fn self_recursive_method_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::at(dir.path());
    let pkg = config.classes_root.join("com/loop");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(
        pkg.join("Spinner.class"),
        class("com.loop.Spinner")
            .method(
                method("spin", "()V")
                    .code(code().invoke_virtual("com/loop/Spinner", "spin", "()V")),
            )
            .build(),
    )
    .unwrap();

    let engine = KnowledgeEngine::open(config).unwrap();
    engine.extract_project().unwrap();
    let found = engine.detect_anti_patterns().unwrap();
    assert_eq!(found, 1);

    let patterns = engine.store().list_anti_patterns().unwrap();
    assert_eq!(patterns[0].rule_id, minerva_engine::RULE_SELF_RECURSION);
    assert_eq!(patterns[0].from_fqn, "com.loop.Spinner.spin()");
}
