use serde::{Deserialize, Serialize};

use crate::attr::AttrMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    Calls,
    Extends,
    Implements,
    MemberOf,
    Autowired,
    Lambda,
    Invokedynamic,
}

impl EdgeRelation {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeRelation::Calls => "calls",
            EdgeRelation::Extends => "extends",
            EdgeRelation::Implements => "implements",
            EdgeRelation::MemberOf => "member_of",
            EdgeRelation::Autowired => "autowired",
            EdgeRelation::Lambda => "lambda",
            EdgeRelation::Invokedynamic => "invokedynamic",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "calls" => Some(EdgeRelation::Calls),
            "extends" => Some(EdgeRelation::Extends),
            "implements" => Some(EdgeRelation::Implements),
            "member_of" => Some(EdgeRelation::MemberOf),
            "autowired" => Some(EdgeRelation::Autowired),
            "lambda" => Some(EdgeRelation::Lambda),
            "invokedynamic" => Some(EdgeRelation::Invokedynamic),
            _ => None,
        }
    }
}

/// A directed relation between two symbols.
///
/// `(from_fqn, to_fqn, relation, kind)` is unique; `kind` carries the call
/// sub-kind (`invokevirtual`, `lambda`, ...) or injection kind
/// (`class:autowired`, `constructor:autowired`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from_fqn: String,
    pub to_fqn: String,
    pub relation: EdgeRelation,
    pub kind: String,
    pub metadata: AttrMap,
}

impl EdgeRecord {
    pub fn new(
        from_fqn: impl Into<String>,
        to_fqn: impl Into<String>,
        relation: EdgeRelation,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            from_fqn: from_fqn.into(),
            to_fqn: to_fqn.into(),
            relation,
            kind: kind.into(),
            metadata: AttrMap::new(),
        }
    }
}
