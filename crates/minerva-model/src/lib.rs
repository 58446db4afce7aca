//! Core shared types for Minerva.
//!
//! This crate is intentionally small: the record types that flow between the
//! analyzer, the graph store, and the rebuild/summarise drivers, plus a few
//! helpers (FQN manipulation, wall-clock millis) everything agrees on.

mod attr;
mod edge;
mod fqn;
mod job;
mod records;
mod symbol;
mod time;

pub use crate::attr::AttrMap;
pub use crate::edge::{EdgeRecord, EdgeRelation};
pub use crate::fqn::{decapitalize, package_of, simple_name};
pub use crate::job::{JobRecord, JobStatus};
pub use crate::records::{
    AntiPatternRecord, ConstraintRecord, EntryPointKind, EntryPointRecord, GlossaryRecord,
    PendingVectorRecord, Severity, SummaryLevel, SummaryRecord,
};
pub use crate::symbol::{SymbolKind, SymbolRecord};
pub use crate::time::now_millis;
