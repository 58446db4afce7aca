use std::path::Path;

use minerva_analyzer::ClassAnalyser;
use minerva_model::EdgeRelation;
use minerva_test_fixtures::{
    class, code, custom_bootstrap, lambda_bootstrap, method, string_concat_bootstrap,
};

fn analyse(bytes: Vec<u8>) -> minerva_analyzer::Analysis {
    ClassAnalyser::new()
        .analyse_bytes(Path::new("com/test/Fixture.class"), &bytes)
        .expect("analysis")
}

#[test]
fn direct_invokes_become_call_edges_with_subkinds() {
    let analysis = analyse(
        class("com.test.Caller")
            .method(
                method("run", "()V").code(
                    code()
                        .invoke_virtual("com/test/Target", "virt", "()V")
                        .invoke_static("com/test/Target", "stat", "(I)V")
                        .invoke_special("com/test/Target", "<init>", "()V")
                        .invoke_interface("com/test/Api", "iface", "()V"),
                ),
            )
            .build(),
    );

    let calls: Vec<_> = analysis
        .edges
        .iter()
        .filter(|e| e.relation == EdgeRelation::Calls)
        .collect();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].from_fqn, "com.test.Caller.run()");
    assert_eq!(calls[0].to_fqn, "com.test.Target.virt()");
    assert_eq!(calls[0].kind, "invokevirtual");
    assert_eq!(calls[1].to_fqn, "com.test.Target.stat(int)");
    assert_eq!(calls[1].kind, "invokestatic");
    assert_eq!(calls[2].to_fqn, "com.test.Target.<init>()");
    assert_eq!(calls[2].kind, "invokespecial");
    assert_eq!(calls[3].to_fqn, "com.test.Api.iface()");
    assert_eq!(calls[3].kind, "invokeinterface");
}

#[test]
fn lambda_metafactory_resolves_to_implementation_method() {
    let analysis = analyse(
        class("com.test.Streamy")
            .method(
                method("run", "()V").code(code().invoke_dynamic(
                    "accept",
                    "()Ljava/util/function/Consumer;",
                    lambda_bootstrap("com/test/Streamy", "lambda$run$0", "(Ljava/lang/String;)V"),
                )),
            )
            .build(),
    );

    let lambda = analysis
        .edges
        .iter()
        .find(|e| e.kind == "lambda")
        .expect("lambda edge");
    assert_eq!(lambda.relation, EdgeRelation::Calls);
    assert_eq!(lambda.from_fqn, "com.test.Streamy.run()");
    assert_eq!(lambda.to_fqn, "com.test.Streamy.lambda$run$0(java.lang.String)");
    assert_eq!(
        lambda.metadata.get_str("bootstrap_method_owner"),
        Some("java.lang.invoke.LambdaMetafactory")
    );
    assert_eq!(lambda.metadata.get_str("bootstrap_method_name"), Some("metafactory"));
    assert_eq!(lambda.metadata.get_str("lambda_name"), Some("accept"));
    assert_eq!(
        lambda.metadata.get_str("lambda_descriptor"),
        Some("()Ljava/util/function/Consumer;")
    );
}

#[test]
fn string_concat_factory_emits_no_edge() {
    let analysis = analyse(
        class("com.test.Concat")
            .method(
                method("fmt", "(I)Ljava/lang/String;").code(code().invoke_dynamic(
                    "makeConcatWithConstants",
                    "(I)Ljava/lang/String;",
                    string_concat_bootstrap("count=\u{1}"),
                )),
            )
            .build(),
    );
    assert!(
        analysis.edges.iter().all(|e| e.relation != EdgeRelation::Calls),
        "string concat must not produce call edges: {:?}",
        analysis.edges
    );
}

#[test]
fn unknown_bootstrap_is_kept_as_invokedynamic() {
    let analysis = analyse(
        class("com.test.Dyn")
            .method(
                method("run", "()V").code(code().invoke_dynamic(
                    "site",
                    "()V",
                    custom_bootstrap("com/test/Boot", "bootstrap", "()Ljava/lang/invoke/CallSite;"),
                )),
            )
            .build(),
    );
    let edge = analysis
        .edges
        .iter()
        .find(|e| e.kind == "invokedynamic")
        .expect("invokedynamic edge");
    assert_eq!(edge.metadata.get_str("bootstrap_method_owner"), Some("com.test.Boot"));
}

#[test]
fn reextraction_of_identical_bytes_is_deterministic() {
    let bytes = class("com.test.Caller")
        .method(
            method("run", "()V").code(
                code()
                    .invoke_virtual("com/test/Target", "a", "()V")
                    .invoke_static("com/test/Target", "b", "()V"),
            ),
        )
        .build();

    let first = analyse(bytes.clone());
    let second = analyse(bytes);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn parse_failure_is_contained_in_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("Good.class");
    let bad = dir.path().join("Bad.class");
    std::fs::write(&good, class("com.test.Good").build()).unwrap();
    std::fs::write(&bad, b"\xCA\xFE\xBA\xBEtruncated").unwrap();

    let batch = ClassAnalyser::new().analyse_batch([&good, &bad]);
    assert_eq!(batch.analyses.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].path, bad);
}
