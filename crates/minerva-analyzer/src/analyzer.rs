use std::path::{Path, PathBuf};

use minerva_classfile::{
    access, parse_field_descriptor, parse_method_descriptor, ClassFile,
    Error as ClassfileError,
};
use minerva_model::{AttrMap, EdgeRecord, EdgeRelation, SymbolKind, SymbolRecord};

use crate::edges::{extract_call_edges, injection_edge, method_fqn};
use crate::error::AnalyzerError;
use crate::keys;
use crate::spring::{
    apply_class_annotations, apply_field_annotations, apply_method_annotations, infer_proxy,
};

/// The result of analysing one classfile: append-only node and edge lists.
#[derive(Debug, Default, Clone)]
pub struct Analysis {
    pub nodes: Vec<SymbolRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug)]
pub struct FailedClass {
    pub path: PathBuf,
    pub error: AnalyzerError,
}

/// The result of analysing many classfiles. Per-class failures are contained
/// and reported; they never abort the batch.
#[derive(Debug, Default)]
pub struct BatchAnalysis {
    pub analyses: Vec<Analysis>,
    pub failures: Vec<FailedClass>,
}

impl BatchAnalysis {
    pub fn total_nodes(&self) -> usize {
        self.analyses.iter().map(|a| a.nodes.len()).sum()
    }

    pub fn total_edges(&self) -> usize {
        self.analyses.iter().map(|a| a.edges.len()).sum()
    }
}

/// Parses one classfile into graph nodes and edges.
#[derive(Debug, Default, Clone)]
pub struct ClassAnalyser;

impl ClassAnalyser {
    pub fn new() -> Self {
        Self
    }

    pub fn analyse(&self, path: &Path) -> Result<Analysis, AnalyzerError> {
        let bytes = std::fs::read(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyse_bytes(path, &bytes)
    }

    pub fn analyse_bytes(&self, path: &Path, bytes: &[u8]) -> Result<Analysis, AnalyzerError> {
        let cf = ClassFile::parse(bytes).map_err(|source: ClassfileError| AnalyzerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(analyse_class(&cf, &path.to_string_lossy()))
    }

    pub fn analyse_batch<I, P>(&self, paths: I) -> BatchAnalysis
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut batch = BatchAnalysis::default();
        for path in paths {
            let path = path.as_ref();
            match self.analyse(path) {
                Ok(analysis) => batch.analyses.push(analysis),
                Err(error) => {
                    tracing::warn!(
                        target = "minerva.analyzer",
                        path = %path.display(),
                        error = %error,
                        "classfile analysis failed; continuing batch"
                    );
                    batch.failures.push(FailedClass {
                        path: path.to_path_buf(),
                        error,
                    });
                }
            }
        }
        batch
    }
}

fn analyse_class(cf: &ClassFile, file_path: &str) -> Analysis {
    let class_fqn = cf.this_class.clone();
    let mut class_attrs = AttrMap::new();
    let traits = apply_class_annotations(cf, &mut class_attrs);

    let mut nodes: Vec<SymbolRecord> = Vec::new();
    let mut edges: Vec<EdgeRecord> = Vec::new();
    let mut class_line: Option<u32> = None;
    let mut needs_advice = traits.class_transactional || traits.class_async;

    // Inheritance edges. `java.lang.Object` as a superclass carries no
    // information and is omitted.
    if let Some(super_class) = cf.super_class.as_deref() {
        if super_class != "java.lang.Object" {
            edges.push(EdgeRecord::new(
                class_fqn.clone(),
                super_class,
                EdgeRelation::Extends,
                "extends",
            ));
        }
    }
    for interface in &cf.interfaces {
        edges.push(EdgeRecord::new(
            class_fqn.clone(),
            interface,
            EdgeRelation::Implements,
            "implements",
        ));
    }

    for method in &cf.methods {
        let fqn = method_fqn(&class_fqn, &method.name, &method.descriptor);
        let mut attrs = AttrMap::new();
        let method_traits = apply_method_annotations(method, &traits, &mut attrs);
        needs_advice |= method_traits.transactional || method_traits.is_async
            || method_traits.has_advice;

        let line = method.code.as_ref().and_then(|c| c.first_line).unwrap_or(0);
        class_line = match (class_line, method.code.as_ref().and_then(|c| c.first_line)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if let Some(signature) = &method.signature {
            attrs.set_str(keys::GENERIC_SIGNATURE, signature);
        }

        let mut node = SymbolRecord::new(fqn.clone(), SymbolKind::Method);
        node.name = method.name.clone();
        node.file_path = file_path.to_string();
        node.line_number = line;
        node.modifiers = modifiers_of(method.access_flags);
        node.signature = Some(method.descriptor.clone());
        node.parent_fqn = Some(class_fqn.clone());
        node.annotations = annotation_names(&method.annotations);
        node.attributes = attrs;
        nodes.push(node);

        if let Some(body) = &method.code {
            extract_call_edges(&fqn, body, &mut edges);
        }

        // Constructor parameters of component classes are injection points.
        if traits.is_component() && method.name == "<init>" {
            if let Ok(desc) = parse_method_descriptor(&method.descriptor) {
                for param in &desc.params {
                    if let Some(edge) =
                        injection_edge(param, &class_fqn, "constructor:autowired", None)
                    {
                        edges.push(edge);
                    }
                }
            }
        }
    }

    for field in &cf.fields {
        let fqn = format!("{class_fqn}.{}", field.name);
        let mut attrs = AttrMap::new();
        let field_traits = apply_field_annotations(field, &mut attrs);

        let mut node = SymbolRecord::new(fqn, SymbolKind::Field);
        node.name = field.name.clone();
        node.file_path = file_path.to_string();
        node.modifiers = modifiers_of(field.access_flags);
        node.signature = Some(field.descriptor.clone());
        node.parent_fqn = Some(class_fqn.clone());
        node.annotations = annotation_names(&field.annotations);
        node.attributes = attrs;
        nodes.push(node);

        if field_traits.injected {
            if let Ok(ty) = parse_field_descriptor(&field.descriptor) {
                if let Some(edge) = injection_edge(
                    &ty,
                    &class_fqn,
                    "class:autowired",
                    field_traits.qualifier.as_deref(),
                ) {
                    edges.push(edge);
                }
            }
        }
    }

    infer_proxy(cf, &traits, needs_advice, &mut class_attrs);

    if traits.quartz_job {
        class_attrs.set_flag(keys::IS_ENTRY_POINT);
        class_attrs.set_str(keys::ENTRY_POINT_TYPE, "quartz_job");
    } else if traits.quartz_job_spring {
        class_attrs.set_flag(keys::IS_ENTRY_POINT);
        class_attrs.set_str(keys::ENTRY_POINT_TYPE, "quartz_job_spring");
    }

    let mut class_node = SymbolRecord::new(class_fqn.clone(), class_kind(cf.access_flags));
    class_node.name = simple_class_name(&class_fqn).to_string();
    class_node.file_path = file_path.to_string();
    class_node.line_number = class_line.unwrap_or(0);
    class_node.modifiers = modifiers_of(cf.access_flags);
    class_node.signature = cf.signature.clone();
    class_node.parent_fqn = enclosing_class(&class_fqn);
    class_node.annotations = annotation_names(&cf.annotations);
    class_node.attributes = class_attrs;

    // Class node leads so parent-before-child insert order holds downstream.
    nodes.insert(0, class_node);

    Analysis { nodes, edges }
}

fn class_kind(flags: u16) -> SymbolKind {
    if flags & access::ACC_ENUM != 0 {
        SymbolKind::Enum
    } else if flags & access::ACC_INTERFACE != 0 {
        SymbolKind::Interface
    } else {
        SymbolKind::Class
    }
}

fn simple_class_name(fqn: &str) -> &str {
    fqn.rsplit(['.', '$']).next().unwrap_or(fqn)
}

/// `com.example.Outer` for `com.example.Outer$Inner`, else `None`.
fn enclosing_class(fqn: &str) -> Option<String> {
    fqn.rfind('$').map(|idx| fqn[..idx].to_string())
}

fn annotation_names(annotations: &[minerva_classfile::Annotation]) -> Vec<String> {
    annotations
        .iter()
        .filter_map(|a| a.type_binary_name())
        .collect()
}

fn modifiers_of(flags: u16) -> Vec<String> {
    let mut out = Vec::new();
    let table: &[(u16, &str)] = &[
        (access::ACC_PUBLIC, "public"),
        (access::ACC_PRIVATE, "private"),
        (access::ACC_PROTECTED, "protected"),
        (access::ACC_STATIC, "static"),
        (access::ACC_FINAL, "final"),
        (access::ACC_SYNCHRONIZED, "synchronized"),
        (access::ACC_VOLATILE, "volatile"),
        (access::ACC_TRANSIENT, "transient"),
        (access::ACC_NATIVE, "native"),
        (access::ACC_ABSTRACT, "abstract"),
        (access::ACC_SYNTHETIC, "synthetic"),
    ];
    for (bit, name) in table {
        if flags & bit != 0 {
            out.push((*name).to_string());
        }
    }
    out
}
