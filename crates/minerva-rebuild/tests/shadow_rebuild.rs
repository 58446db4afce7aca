//! Shadow rebuild: population, integrity gating, swap, crash recovery,
//! backup retention.

use std::path::PathBuf;
use std::time::Duration;

use minerva_analyzer::ClassAnalyser;
use minerva_rebuild::{
    collect_classfiles, sweep_backups, IntegrityThresholds, RebuildError, ShadowRebuilder,
};
use minerva_store::{sibling_path, GraphStore, SwapRecovery, TMP_SWAP_SUFFIX};
use minerva_test_fixtures::{class, code, method};

fn write_fixture_tree(dir: &std::path::Path) -> Vec<PathBuf> {
    let pkg = dir.join("com/shop");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(
        pkg.join("OrderService.class"),
        class("com.shop.OrderService")
            .method(
                method("place", "()V").code(
                    code().invoke_virtual("com/shop/OrderRepository", "save", "()V"),
                ),
            )
            .build(),
    )
    .unwrap();
    std::fs::write(
        pkg.join("OrderRepository.class"),
        class("com.shop.OrderRepository")
            .method(method("save", "()V").code(code().ret()))
            .build(),
    )
    .unwrap();
    collect_classfiles(dir).unwrap()
}

#[test]
fn full_rebuild_populates_and_swaps() {
    let dir = tempfile::tempdir().unwrap();
    let classes = write_fixture_tree(&dir.path().join("classes"));
    let db_path = dir.path().join("graph.db");

    let store = GraphStore::open(&db_path).unwrap();
    let analyser = ClassAnalyser::new();
    let outcome = ShadowRebuilder::new(&store, &analyser)
        .rebuild(&classes, &|| false)
        .unwrap();

    assert!(outcome.integrity.passed());
    // 2 classes, 2 declared methods.
    assert_eq!(outcome.integrity.symbol_count, 4);
    assert!(outcome.extract.failures.is_empty());

    // The swapped-in database serves through the same store handle.
    assert!(store.get_symbol("com.shop.OrderService").unwrap().is_some());
    let impact = store.impact("com.shop.OrderRepository.save()", 3).unwrap();
    assert_eq!(impact.len(), 1);
    assert_eq!(impact[0].fqn, "com.shop.OrderService.place()");

    // No leftovers besides the backup of the (empty) original database.
    assert!(!sibling_path(&db_path, TMP_SWAP_SUFFIX).exists());
}

#[test]
fn rebuild_of_unchanged_input_is_equivalent() {
    let dir = tempfile::tempdir().unwrap();
    let classes = write_fixture_tree(&dir.path().join("classes"));
    let db_path = dir.path().join("graph.db");

    let store = GraphStore::open(&db_path).unwrap();
    let analyser = ClassAnalyser::new();
    let rebuilder = ShadowRebuilder::new(&store, &analyser);

    let first = rebuilder.rebuild(&classes, &|| false).unwrap();
    let symbols_before = store.symbol_count().unwrap();
    let edges_before = store.edge_count().unwrap();

    let second = rebuilder.rebuild(&classes, &|| false).unwrap();
    assert_eq!(first.integrity.symbol_count, second.integrity.symbol_count);
    assert_eq!(store.symbol_count().unwrap(), symbols_before);
    assert_eq!(store.edge_count().unwrap(), edges_before);
}

#[test]
fn integrity_floor_rejects_and_discards_shadow() {
    let dir = tempfile::tempdir().unwrap();
    let classes = write_fixture_tree(&dir.path().join("classes"));
    let db_path = dir.path().join("graph.db");

    let store = GraphStore::open(&db_path).unwrap();
    let analyser = ClassAnalyser::new();
    let err = ShadowRebuilder::new(&store, &analyser)
        .with_thresholds(IntegrityThresholds {
            min_symbols: 1_000,
            max_stale_ratio: 1.0,
        })
        .rebuild(&classes, &|| false)
        .unwrap_err();
    assert!(matches!(err, RebuildError::IntegrityFailed(_)));

    // No shadow siblings survive a rejection.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(".new."))
        .collect();
    assert!(leftovers.is_empty(), "leftover shadow files: {leftovers:?}");
}

#[test]
fn cancellation_discards_shadow() {
    let dir = tempfile::tempdir().unwrap();
    let classes = write_fixture_tree(&dir.path().join("classes"));
    let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
    let analyser = ClassAnalyser::new();

    let err = ShadowRebuilder::new(&store, &analyser)
        .rebuild(&classes, &|| true)
        .unwrap_err();
    assert!(matches!(err, RebuildError::Cancelled));
    assert_eq!(store.symbol_count().unwrap(), 0);
}

#[test]
fn crash_between_first_and_second_move_keeps_original() {
    // Simulate the rebuild dying after `new → tmp_swap` but before
    // `current → backup`: on restart the original database must serve and
    // the tmp_swap must be cleaned.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");

    {
        let store = GraphStore::open(&db_path).unwrap();
        store
            .upsert_symbols(&[minerva_model::SymbolRecord::new(
                "com.orig.Kept",
                minerva_model::SymbolKind::Class,
            )])
            .unwrap();
    }
    // The half-finished rebuild's tmp_swap (a valid database built aside).
    let tmp_swap = sibling_path(&db_path, TMP_SWAP_SUFFIX);
    {
        let aside = GraphStore::open(dir.path().join("aside.db")).unwrap();
        aside
            .upsert_symbols(&[minerva_model::SymbolRecord::new(
                "com.next.NotYet",
                minerva_model::SymbolKind::Class,
            )])
            .unwrap();
    }
    std::fs::rename(dir.path().join("aside.db"), &tmp_swap).unwrap();

    let store = GraphStore::open(&db_path).unwrap();
    assert_eq!(*store.swap_recovery(), SwapRecovery::RemovedStaleTmpSwap);
    assert!(store.get_symbol("com.orig.Kept").unwrap().is_some());
    assert!(store.get_symbol("com.next.NotYet").unwrap().is_none());
    assert!(!tmp_swap.exists());
}

#[test]
fn crash_after_current_retired_promotes_tmp_swap() {
    // Between `current → backup` and `tmp_swap → current`, only tmp_swap
    // and the backup exist. Recovery must promote tmp_swap (the newest
    // complete build).
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");

    {
        let store = GraphStore::open(&db_path).unwrap();
        store
            .upsert_symbols(&[minerva_model::SymbolRecord::new(
                "com.next.New",
                minerva_model::SymbolKind::Class,
            )])
            .unwrap();
    }
    let tmp_swap = sibling_path(&db_path, TMP_SWAP_SUFFIX);
    std::fs::rename(&db_path, &tmp_swap).unwrap();
    // An older backup also exists.
    {
        let old = GraphStore::open(dir.path().join("old.db")).unwrap();
        old.upsert_symbols(&[minerva_model::SymbolRecord::new(
            "com.orig.Old",
            minerva_model::SymbolKind::Class,
        )])
        .unwrap();
    }
    std::fs::rename(
        dir.path().join("old.db"),
        sibling_path(&db_path, "backup.1000"),
    )
    .unwrap();

    let store = GraphStore::open(&db_path).unwrap();
    assert!(matches!(*store.swap_recovery(), SwapRecovery::Promoted { .. }));
    assert!(store.get_symbol("com.next.New").unwrap().is_some());
}

#[test]
fn corrupt_tmp_swap_falls_back_to_backup() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");

    std::fs::write(sibling_path(&db_path, TMP_SWAP_SUFFIX), b"not a database").unwrap();
    {
        let old = GraphStore::open(dir.path().join("old.db")).unwrap();
        old.upsert_symbols(&[minerva_model::SymbolRecord::new(
            "com.orig.Backup",
            minerva_model::SymbolKind::Class,
        )])
        .unwrap();
    }
    std::fs::rename(
        dir.path().join("old.db"),
        sibling_path(&db_path, "backup.2000"),
    )
    .unwrap();

    let store = GraphStore::open(&db_path).unwrap();
    assert!(matches!(*store.swap_recovery(), SwapRecovery::Promoted { .. }));
    assert!(store.get_symbol("com.orig.Backup").unwrap().is_some());
}

#[test]
fn backup_retention_sweep_removes_only_expired() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");
    let old = sibling_path(&db_path, "backup.1000");
    std::fs::write(&old, b"ancient").unwrap();
    let fresh_ts = minerva_model::now_millis();
    let fresh = sibling_path(&db_path, &format!("backup.{fresh_ts}"));
    std::fs::write(&fresh, b"fresh").unwrap();

    let removed = sweep_backups(&db_path, Duration::from_secs(3600));
    assert_eq!(removed, 1);
    assert!(!old.exists());
    assert!(fresh.exists());
}
