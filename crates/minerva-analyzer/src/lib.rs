//! Bytecode analysis: one classfile in, graph nodes and edges out.
//!
//! The analyser recognises a closed set of Spring / JEE / MyBatis / Quartz
//! annotations, infers AOP proxy strategy, tags entry points, and extracts
//! call edges including `invokedynamic` lambda resolution. Per-class parse
//! failures are contained: a bad classfile is logged and reported, never
//! fatal to a batch.

#![forbid(unsafe_code)]

mod analyzer;
mod annotations;
mod edges;
mod error;
mod spring;

pub use crate::analyzer::{Analysis, BatchAnalysis, ClassAnalyser, FailedClass};
pub use crate::error::AnalyzerError;

/// Well-known attribute keys written by the analyser.
pub mod keys {
    pub const SPRING_BEAN: &str = "spring_bean";
    pub const SPRING_BEAN_TYPE: &str = "spring_bean_type";
    pub const SPRING_BEAN_NAME: &str = "spring_bean_name";
    pub const FINAL_CLASS: &str = "final_class";
    pub const NEEDS_PROXY: &str = "needs_proxy";
    pub const PROXY_TYPE: &str = "proxy_type";
    pub const ASYNC: &str = "async";
    pub const ASYNC_EXECUTOR: &str = "async_executor";
    pub const TRANSACTIONAL: &str = "transactional";
    pub const TRANSACTION_PROPAGATION: &str = "transaction_propagation";
    pub const TRANSACTION_ISOLATION: &str = "transaction_isolation";
    pub const TRANSACTION_TIMEOUT: &str = "transaction_timeout";
    pub const TRANSACTION_READ_ONLY: &str = "transaction_read_only";
    pub const SCHEDULED: &str = "scheduled";
    pub const SCHEDULED_CRON: &str = "scheduled_cron";
    pub const SCHEDULED_FIXED_RATE: &str = "scheduled_fixed_rate";
    pub const SCHEDULED_FIXED_DELAY: &str = "scheduled_fixed_delay";
    pub const BEAN_METHOD: &str = "bean_method";
    pub const BEAN_NAME: &str = "bean_name";
    pub const BEAN_INIT_METHOD: &str = "bean_init_method";
    pub const BEAN_DESTROY_METHOD: &str = "bean_destroy_method";
    pub const ASPECT: &str = "aspect";
    pub const ADVICE_TYPE: &str = "advice_type";
    pub const POINTCUT_EXPRESSION: &str = "pointcut_expression";
    pub const MYBATIS_MAPPER: &str = "mybatis_mapper";
    pub const MYBATIS_SQL: &str = "mybatis_sql";
    pub const MYBATIS_STATEMENT_TYPE: &str = "mybatis_statement_type";
    pub const IS_ENTRY_POINT: &str = "is_entry_point";
    pub const ENTRY_POINT_TYPE: &str = "entry_point_type";
    pub const HTTP_METHOD: &str = "http_method";
    pub const HTTP_PATH: &str = "http_path";
    pub const AUTOWIRED: &str = "autowired";
    pub const QUALIFIER: &str = "qualifier";
    pub const VALUE_EXPRESSION: &str = "value_expression";
    pub const PRIMARY: &str = "primary";
    pub const LAZY: &str = "lazy";
    pub const SCOPE: &str = "scope";
    pub const GENERIC_SIGNATURE: &str = "generic_signature";

    pub const LAMBDA_NAME: &str = "lambda_name";
    pub const LAMBDA_DESCRIPTOR: &str = "lambda_descriptor";
    pub const BOOTSTRAP_METHOD_OWNER: &str = "bootstrap_method_owner";
    pub const BOOTSTRAP_METHOD_NAME: &str = "bootstrap_method_name";
}
