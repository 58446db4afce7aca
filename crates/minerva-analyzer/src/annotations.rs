//! The closed set of annotation types the analyser recognises.

pub const COMPONENT: &str = "org.springframework.stereotype.Component";
pub const SERVICE: &str = "org.springframework.stereotype.Service";
pub const REPOSITORY: &str = "org.springframework.stereotype.Repository";
pub const CONTROLLER: &str = "org.springframework.stereotype.Controller";
pub const REST_CONTROLLER: &str = "org.springframework.web.bind.annotation.RestController";
pub const CONFIGURATION: &str = "org.springframework.context.annotation.Configuration";

pub const AUTOWIRED: &str = "org.springframework.beans.factory.annotation.Autowired";
pub const QUALIFIER: &str = "org.springframework.beans.factory.annotation.Qualifier";
pub const VALUE: &str = "org.springframework.beans.factory.annotation.Value";
pub const INJECT: &str = "javax.inject.Inject";
pub const INJECT_JAKARTA: &str = "jakarta.inject.Inject";
pub const RESOURCE: &str = "javax.annotation.Resource";
pub const RESOURCE_JAKARTA: &str = "jakarta.annotation.Resource";

pub const TRANSACTIONAL: &str = "org.springframework.transaction.annotation.Transactional";
pub const ASYNC: &str = "org.springframework.scheduling.annotation.Async";
pub const SCHEDULED: &str = "org.springframework.scheduling.annotation.Scheduled";
pub const BEAN: &str = "org.springframework.context.annotation.Bean";
pub const PRIMARY: &str = "org.springframework.context.annotation.Primary";
pub const SCOPE: &str = "org.springframework.context.annotation.Scope";
pub const LAZY: &str = "org.springframework.context.annotation.Lazy";

pub const ASPECT: &str = "org.aspectj.lang.annotation.Aspect";
pub const BEFORE: &str = "org.aspectj.lang.annotation.Before";
pub const AFTER: &str = "org.aspectj.lang.annotation.After";
pub const AROUND: &str = "org.aspectj.lang.annotation.Around";
pub const AFTER_RETURNING: &str = "org.aspectj.lang.annotation.AfterReturning";
pub const AFTER_THROWING: &str = "org.aspectj.lang.annotation.AfterThrowing";

pub const MYBATIS_MAPPER: &str = "org.apache.ibatis.annotations.Mapper";
pub const MYBATIS_SELECT: &str = "org.apache.ibatis.annotations.Select";
pub const MYBATIS_INSERT: &str = "org.apache.ibatis.annotations.Insert";
pub const MYBATIS_UPDATE: &str = "org.apache.ibatis.annotations.Update";
pub const MYBATIS_DELETE: &str = "org.apache.ibatis.annotations.Delete";

pub const REQUEST_MAPPING: &str = "org.springframework.web.bind.annotation.RequestMapping";
pub const GET_MAPPING: &str = "org.springframework.web.bind.annotation.GetMapping";
pub const POST_MAPPING: &str = "org.springframework.web.bind.annotation.PostMapping";
pub const PUT_MAPPING: &str = "org.springframework.web.bind.annotation.PutMapping";
pub const DELETE_MAPPING: &str = "org.springframework.web.bind.annotation.DeleteMapping";
pub const PATCH_MAPPING: &str = "org.springframework.web.bind.annotation.PatchMapping";

pub const QUARTZ_JOB_INTERFACE: &str = "org.quartz.Job";
pub const QUARTZ_JOB_BEAN: &str = "org.springframework.scheduling.quartz.QuartzJobBean";

/// Spring stereotype → `spring_bean_type` attribute value.
pub fn stereotype_kind(annotation_type: &str) -> Option<&'static str> {
    match annotation_type {
        COMPONENT => Some("component"),
        SERVICE => Some("service"),
        REPOSITORY => Some("repository"),
        CONTROLLER => Some("controller"),
        REST_CONTROLLER => Some("rest_controller"),
        CONFIGURATION => Some("configuration"),
        _ => None,
    }
}

pub fn is_injection_marker(annotation_type: &str) -> bool {
    matches!(
        annotation_type,
        AUTOWIRED | INJECT | INJECT_JAKARTA | RESOURCE | RESOURCE_JAKARTA
    )
}

/// AOP advice annotation → `advice_type` attribute value.
pub fn advice_kind(annotation_type: &str) -> Option<&'static str> {
    match annotation_type {
        BEFORE => Some("before"),
        AFTER => Some("after"),
        AROUND => Some("around"),
        AFTER_RETURNING => Some("after_returning"),
        AFTER_THROWING => Some("after_throwing"),
        _ => None,
    }
}

/// MyBatis statement annotation → `mybatis_statement_type` attribute value.
pub fn mybatis_statement_kind(annotation_type: &str) -> Option<&'static str> {
    match annotation_type {
        MYBATIS_SELECT => Some("select"),
        MYBATIS_INSERT => Some("insert"),
        MYBATIS_UPDATE => Some("update"),
        MYBATIS_DELETE => Some("delete"),
        _ => None,
    }
}

/// HTTP mapping annotation → fixed method, when the annotation implies one.
pub fn http_mapping_method(annotation_type: &str) -> Option<Option<&'static str>> {
    match annotation_type {
        REQUEST_MAPPING => Some(None),
        GET_MAPPING => Some(Some("GET")),
        POST_MAPPING => Some(Some("POST")),
        PUT_MAPPING => Some(Some("PUT")),
        DELETE_MAPPING => Some(Some("DELETE")),
        PATCH_MAPPING => Some(Some("PATCH")),
        _ => None,
    }
}
