use serde::{Deserialize, Serialize};

use crate::attr::AttrMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Method,
    Field,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "method" => Some(SymbolKind::Method),
            "field" => Some(SymbolKind::Field),
            _ => None,
        }
    }
}

/// One declared class, interface, enum, method, or field.
///
/// `fqn` is globally unique; `parent_fqn` links members to their declaring
/// class and nested classes to their enclosing class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub fqn: String,
    pub kind: SymbolKind,
    pub name: String,
    pub file_path: String,
    pub line_number: u32,
    pub modifiers: Vec<String>,
    pub signature: Option<String>,
    pub parent_fqn: Option<String>,
    pub annotations: Vec<String>,
    pub attributes: AttrMap,
}

impl SymbolRecord {
    pub fn new(fqn: impl Into<String>, kind: SymbolKind) -> Self {
        let fqn = fqn.into();
        let name = crate::fqn::simple_name(&fqn).to_string();
        Self {
            fqn,
            kind,
            name,
            file_path: String::new(),
            line_number: 0,
            modifiers: Vec::new(),
            signature: None,
            parent_fqn: None,
            annotations: Vec::new(),
            attributes: AttrMap::new(),
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum
        )
    }
}
