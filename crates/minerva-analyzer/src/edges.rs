//! Call and injection edge extraction.

use minerva_classfile::{binary_name, parse_method_descriptor, CodeBody, FieldType};
use minerva_model::{AttrMap, EdgeRecord, EdgeRelation};

use crate::keys;

/// Types that never materialise as edges: JVM primitives, their boxed
/// wrappers, and `java.lang.String`.
pub(crate) fn is_filtered_type(ty: &FieldType) -> bool {
    match ty.element_type() {
        FieldType::Primitive(_) => true,
        FieldType::Object(internal) => matches!(
            internal.as_str(),
            "java/lang/Byte"
                | "java/lang/Character"
                | "java/lang/Short"
                | "java/lang/Integer"
                | "java/lang/Long"
                | "java/lang/Float"
                | "java/lang/Double"
                | "java/lang/Boolean"
                | "java/lang/String"
        ),
        FieldType::Array(_) => unreachable!("element_type strips arrays"),
    }
}

/// `com.example.Service.method(java.lang.String,int)` from an owner binary
/// name and a method descriptor. Falls back to the raw descriptor when it
/// does not parse, so a single odd constant cannot sink the class.
pub(crate) fn method_fqn(owner: &str, name: &str, descriptor: &str) -> String {
    match parse_method_descriptor(descriptor) {
        Ok(desc) => {
            let params: Vec<String> = desc.params.iter().map(FieldType::display_name).collect();
            format!("{owner}.{name}({})", params.join(","))
        }
        Err(_) => format!("{owner}.{name}{descriptor}"),
    }
}

/// Emit call edges for one method body: direct invokes, lambda call sites,
/// and other `invokedynamic` instructions.
pub(crate) fn extract_call_edges(from_fqn: &str, body: &CodeBody, edges: &mut Vec<EdgeRecord>) {
    for invoke in &body.invokes {
        let to_fqn = method_fqn(&binary_name(&invoke.owner), &invoke.name, &invoke.descriptor);
        edges.push(EdgeRecord::new(
            from_fqn,
            to_fqn,
            EdgeRelation::Calls,
            invoke.kind.mnemonic(),
        ));
    }

    for site in &body.dynamic_invokes {
        let bootstrap_owner = site.bootstrap.owner_binary_name();
        match bootstrap_owner.as_str() {
            "java.lang.invoke.LambdaMetafactory" => {
                // args[1] of the metafactory is the implementation handle; a
                // metafactory call without one is malformed and skipped.
                let Some(minerva_classfile::BootstrapArg::MethodHandle(handle)) =
                    site.bootstrap.args.get(1)
                else {
                    tracing::warn!(
                        target = "minerva.analyzer",
                        from = from_fqn,
                        "LambdaMetafactory bootstrap without implementation handle"
                    );
                    continue;
                };
                let to_fqn =
                    method_fqn(&binary_name(&handle.owner), &handle.name, &handle.descriptor);
                let mut metadata = AttrMap::new();
                metadata.set_str(keys::LAMBDA_NAME, &site.name);
                metadata.set_str(keys::LAMBDA_DESCRIPTOR, &site.descriptor);
                metadata.set_str(keys::BOOTSTRAP_METHOD_OWNER, &bootstrap_owner);
                metadata.set_str(keys::BOOTSTRAP_METHOD_NAME, &site.bootstrap.method.name);
                let mut edge = EdgeRecord::new(from_fqn, to_fqn, EdgeRelation::Calls, "lambda");
                edge.metadata = metadata;
                edges.push(edge);
            }
            // String concatenation indy sites carry no call-graph information.
            "java.lang.invoke.StringConcatFactory" => {}
            _ => {
                let to_fqn = method_fqn(
                    &bootstrap_owner,
                    &site.bootstrap.method.name,
                    &site.bootstrap.method.descriptor,
                );
                let mut metadata = AttrMap::new();
                metadata.set_str(keys::LAMBDA_NAME, &site.name);
                metadata.set_str(keys::LAMBDA_DESCRIPTOR, &site.descriptor);
                metadata.set_str(keys::BOOTSTRAP_METHOD_OWNER, &bootstrap_owner);
                metadata.set_str(keys::BOOTSTRAP_METHOD_NAME, &site.bootstrap.method.name);
                let mut edge =
                    EdgeRecord::new(from_fqn, to_fqn, EdgeRelation::Calls, "invokedynamic");
                edge.metadata = metadata;
                edges.push(edge);
            }
        }
    }
}

/// A dependency-injection edge: `from` is the injected type, `to` the
/// declaring class.
pub(crate) fn injection_edge(
    injected_type: &FieldType,
    declaring_class: &str,
    kind: &str,
    qualifier: Option<&str>,
) -> Option<EdgeRecord> {
    if is_filtered_type(injected_type) {
        return None;
    }
    let FieldType::Object(internal) = injected_type.element_type() else {
        return None;
    };
    let mut edge = EdgeRecord::new(
        binary_name(internal),
        declaring_class,
        EdgeRelation::MemberOf,
        kind,
    );
    if let Some(qualifier) = qualifier {
        edge.metadata.set_str(keys::QUALIFIER, qualifier);
    }
    Some(edge)
}
