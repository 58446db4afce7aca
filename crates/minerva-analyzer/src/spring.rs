//! Framework metadata: Spring, AOP, MyBatis, Quartz, and web annotations
//! applied to node attribute bags.

use minerva_classfile::{access, Annotation, ClassFile, FieldInfo, MethodInfo};
use minerva_model::{decapitalize, AttrMap};

use crate::annotations as ann;
use crate::keys;

/// Class-level facts that method/field handling needs.
#[derive(Debug, Default)]
pub(crate) struct ClassTraits {
    pub stereotype: Option<&'static str>,
    pub is_aspect: bool,
    pub class_transactional: bool,
    pub class_async: bool,
    pub is_controller: bool,
    pub base_http_path: Option<String>,
    pub quartz_job: bool,
    pub quartz_job_spring: bool,
}

impl ClassTraits {
    pub fn is_component(&self) -> bool {
        self.stereotype.is_some()
    }
}

#[derive(Debug, Default)]
pub(crate) struct MethodTraits {
    pub transactional: bool,
    pub is_async: bool,
    pub has_advice: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FieldTraits {
    pub injected: bool,
    pub qualifier: Option<String>,
}

pub(crate) fn apply_class_annotations(cf: &ClassFile, attrs: &mut AttrMap) -> ClassTraits {
    let mut traits = ClassTraits::default();
    let simple = cf
        .this_class
        .rsplit(['.', '$'])
        .next()
        .unwrap_or(&cf.this_class);

    for annotation in &cf.annotations {
        let Some(type_name) = annotation.type_binary_name() else {
            continue;
        };

        if let Some(kind) = ann::stereotype_kind(&type_name) {
            traits.stereotype = Some(kind);
            attrs.set_flag(keys::SPRING_BEAN);
            attrs.set_str(keys::SPRING_BEAN_TYPE, kind);
            // Default bean name: simple name with the first letter
            // lower-cased, unless the annotation carries an explicit value.
            let bean_name = annotation
                .string_element("value")
                .map(str::to_string)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| decapitalize(simple));
            attrs.set_str(keys::SPRING_BEAN_NAME, bean_name);
            if matches!(kind, "controller" | "rest_controller") {
                traits.is_controller = true;
            }
        }

        match type_name.as_str() {
            ann::ASPECT => {
                traits.is_aspect = true;
                attrs.set_flag(keys::ASPECT);
            }
            ann::TRANSACTIONAL => {
                traits.class_transactional = true;
                apply_transactional(annotation, attrs);
            }
            ann::ASYNC => {
                traits.class_async = true;
                apply_async(annotation, attrs);
            }
            ann::MYBATIS_MAPPER => {
                attrs.set_flag(keys::MYBATIS_MAPPER);
            }
            ann::PRIMARY => attrs.set_flag(keys::PRIMARY),
            ann::LAZY => attrs.set_flag(keys::LAZY),
            ann::SCOPE => {
                if let Some(scope) = annotation.string_element("value") {
                    attrs.set_str(keys::SCOPE, scope);
                }
            }
            ann::REQUEST_MAPPING => {
                traits.base_http_path = annotation
                    .string_element("value")
                    .or_else(|| annotation.string_element("path"))
                    .map(str::to_string);
            }
            _ => {}
        }
    }

    if cf.access_flags & access::ACC_FINAL != 0 {
        attrs.set_flag(keys::FINAL_CLASS);
    }

    traits.quartz_job = cf
        .interfaces
        .iter()
        .any(|i| i == ann::QUARTZ_JOB_INTERFACE);
    traits.quartz_job_spring = cf.super_class.as_deref() == Some(ann::QUARTZ_JOB_BEAN);

    traits
}

pub(crate) fn apply_method_annotations(
    method: &MethodInfo,
    class_traits: &ClassTraits,
    attrs: &mut AttrMap,
) -> MethodTraits {
    let mut traits = MethodTraits::default();

    for annotation in &method.annotations {
        let Some(type_name) = annotation.type_binary_name() else {
            continue;
        };

        if let Some(advice) = ann::advice_kind(&type_name) {
            traits.has_advice = true;
            attrs.set_str(keys::ADVICE_TYPE, advice);
            if let Some(expr) = annotation
                .string_element("value")
                .or_else(|| annotation.string_element("pointcut"))
            {
                attrs.set_str(keys::POINTCUT_EXPRESSION, expr);
            }
            continue;
        }

        if let Some(statement) = ann::mybatis_statement_kind(&type_name) {
            attrs.set_str(keys::MYBATIS_STATEMENT_TYPE, statement);
            if let Some(sql) = annotation.string_element("value") {
                attrs.set_str(keys::MYBATIS_SQL, sql);
            }
            continue;
        }

        if let Some(fixed_method) = ann::http_mapping_method(&type_name) {
            if class_traits.is_controller {
                let path = annotation
                    .string_element("value")
                    .or_else(|| annotation.string_element("path"))
                    .unwrap_or("");
                let full = join_http_path(class_traits.base_http_path.as_deref(), path);
                attrs.set_flag(keys::IS_ENTRY_POINT);
                attrs.set_str(keys::ENTRY_POINT_TYPE, "http");
                attrs.set_str(keys::HTTP_PATH, full);
                let http_method = fixed_method
                    .or_else(|| annotation.enum_element("method").and_then(request_method))
                    .unwrap_or("GET");
                attrs.set_str(keys::HTTP_METHOD, http_method);
            }
            continue;
        }

        match type_name.as_str() {
            ann::TRANSACTIONAL => {
                traits.transactional = true;
                apply_transactional(annotation, attrs);
            }
            ann::ASYNC => {
                traits.is_async = true;
                apply_async(annotation, attrs);
            }
            ann::SCHEDULED => {
                attrs.set_flag(keys::SCHEDULED);
                attrs.set_flag(keys::IS_ENTRY_POINT);
                attrs.set_str(keys::ENTRY_POINT_TYPE, "scheduled");
                if let Some(cron) = annotation.string_element("cron") {
                    attrs.set_str(keys::SCHEDULED_CRON, cron);
                }
                if let Some(rate) = annotation.int_element("fixedRate") {
                    attrs.set_i64(keys::SCHEDULED_FIXED_RATE, rate);
                }
                if let Some(delay) = annotation.int_element("fixedDelay") {
                    attrs.set_i64(keys::SCHEDULED_FIXED_DELAY, delay);
                }
            }
            ann::BEAN => {
                attrs.set_flag(keys::BEAN_METHOD);
                let bean_name = annotation
                    .string_element("name")
                    .or_else(|| annotation.string_element("value"))
                    .unwrap_or(&method.name);
                attrs.set_str(keys::BEAN_NAME, bean_name);
                if let Some(init) = annotation.string_element("initMethod") {
                    attrs.set_str(keys::BEAN_INIT_METHOD, init);
                }
                if let Some(destroy) = annotation.string_element("destroyMethod") {
                    attrs.set_str(keys::BEAN_DESTROY_METHOD, destroy);
                }
            }
            ann::PRIMARY => attrs.set_flag(keys::PRIMARY),
            ann::SCOPE => {
                if let Some(scope) = annotation.string_element("value") {
                    attrs.set_str(keys::SCOPE, scope);
                }
            }
            _ => {}
        }
    }

    // Class-level @Transactional/@Async advice applies to public instance
    // methods; record inheritance so staleness propagation sees it.
    if class_traits.class_transactional && !traits.transactional {
        if method.access_flags & access::ACC_STATIC == 0 && method.name != "<init>" {
            traits.transactional = true;
            attrs.set_flag(keys::TRANSACTIONAL);
        }
    }
    if class_traits.class_async && !traits.is_async {
        if method.access_flags & access::ACC_STATIC == 0 && method.name != "<init>" {
            traits.is_async = true;
            attrs.set_flag(keys::ASYNC);
        }
    }

    // Quartz entry methods.
    if class_traits.quartz_job && method.name == "execute" {
        attrs.set_flag(keys::IS_ENTRY_POINT);
        attrs.set_str(keys::ENTRY_POINT_TYPE, "quartz_job");
    }
    if class_traits.quartz_job_spring && method.name == "executeInternal" {
        attrs.set_flag(keys::IS_ENTRY_POINT);
        attrs.set_str(keys::ENTRY_POINT_TYPE, "quartz_job_spring");
    }

    traits
}

pub(crate) fn apply_field_annotations(field: &FieldInfo, attrs: &mut AttrMap) -> FieldTraits {
    let mut traits = FieldTraits::default();
    for annotation in &field.annotations {
        let Some(type_name) = annotation.type_binary_name() else {
            continue;
        };
        if ann::is_injection_marker(&type_name) {
            traits.injected = true;
            attrs.set_flag(keys::AUTOWIRED);
        } else if type_name == ann::QUALIFIER {
            if let Some(value) = annotation.string_element("value") {
                traits.qualifier = Some(value.to_string());
                attrs.set_str(keys::QUALIFIER, value);
            }
        } else if type_name == ann::VALUE {
            if let Some(expr) = annotation.string_element("value") {
                attrs.set_str(keys::VALUE_EXPRESSION, expr);
            }
        }
    }
    traits
}

/// AOP proxy strategy, inferred statically from class shape. Heuristic:
/// `jdk_or_cglib` means both strategies could apply and callers must not
/// treat the value as a promise.
pub(crate) fn infer_proxy(cf: &ClassFile, traits: &ClassTraits, needs_advice: bool, attrs: &mut AttrMap) {
    let candidate = traits.is_component() || traits.is_aspect || needs_advice;
    if !candidate {
        return;
    }
    if needs_advice || traits.is_aspect {
        attrs.set_flag(keys::NEEDS_PROXY);
    }
    let is_final = cf.access_flags & access::ACC_FINAL != 0;
    let proxy_type = if is_final || cf.interfaces.is_empty() {
        "cglib"
    } else {
        "jdk_or_cglib"
    };
    attrs.set_str(keys::PROXY_TYPE, proxy_type);
}

fn apply_transactional(annotation: &Annotation, attrs: &mut AttrMap) {
    attrs.set_flag(keys::TRANSACTIONAL);
    if let Some(propagation) = annotation.enum_element("propagation") {
        attrs.set_str(keys::TRANSACTION_PROPAGATION, propagation);
    }
    if let Some(isolation) = annotation.enum_element("isolation") {
        attrs.set_str(keys::TRANSACTION_ISOLATION, isolation);
    }
    if let Some(timeout) = annotation.int_element("timeout") {
        attrs.set_i64(keys::TRANSACTION_TIMEOUT, timeout);
    }
    if let Some(read_only) = annotation.bool_element("readOnly") {
        attrs.set_bool(keys::TRANSACTION_READ_ONLY, read_only);
    }
}

fn apply_async(annotation: &Annotation, attrs: &mut AttrMap) {
    attrs.set_flag(keys::ASYNC);
    if let Some(executor) = annotation.string_element("value") {
        if !executor.is_empty() {
            attrs.set_str(keys::ASYNC_EXECUTOR, executor);
        }
    }
}

fn join_http_path(base: Option<&str>, path: &str) -> String {
    match base {
        Some(base) if !base.is_empty() => {
            let base = base.trim_end_matches('/');
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{base}/{}", path.trim_start_matches('/'))
            }
        }
        _ => path.to_string(),
    }
}

fn request_method(constant: &str) -> Option<&'static str> {
    match constant {
        "GET" => Some("GET"),
        "POST" => Some("POST"),
        "PUT" => Some("PUT"),
        "DELETE" => Some("DELETE"),
        "PATCH" => Some("PATCH"),
        "HEAD" => Some("HEAD"),
        "OPTIONS" => Some("OPTIONS"),
        _ => None,
    }
}
