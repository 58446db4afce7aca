//! The knowledge-graph engine facade.
//!
//! `KnowledgeEngine` wires the analyser, the dual store, the rebuild
//! drivers, and the summariser behind one synchronous in-process API.
//! HTTP servers, CLIs, and other adapters call these operations through a
//! worker pool of their own; nothing here depends on a transport.

#![forbid(unsafe_code)]

mod config;
mod engine;
mod error;
mod rules;

pub use crate::config::EngineConfig;
pub use crate::engine::{
    KnowledgeEngine, SearchHit, JOB_REBUILD_FULL, JOB_REBUILD_INCREMENTAL,
};
pub use crate::error::EngineError;
pub use crate::rules::{RULE_ENTRY_CALLS_ENTRY, RULE_SELF_RECURSION};
