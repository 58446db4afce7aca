use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Method,
    Class,
    Package,
    Module,
}

impl SummaryLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryLevel::Method => "method",
            SummaryLevel::Class => "class",
            SummaryLevel::Package => "package",
            SummaryLevel::Module => "module",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "method" => Some(SummaryLevel::Method),
            "class" => Some(SummaryLevel::Class),
            "package" => Some(SummaryLevel::Package),
            "module" => Some(SummaryLevel::Module),
            _ => None,
        }
    }
}

/// One generated summary for a symbol at a given level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub target_fqn: String,
    pub level: SummaryLevel,
    pub summary: String,
    pub vector_id: Option<String>,
    pub is_stale: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryRecord {
    pub code_term: String,
    pub business_meaning: String,
    pub synonyms: Vec<String>,
    pub source_fqn: Option<String>,
    pub vector_id: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub name: String,
    pub constraint_type: String,
    pub description: String,
    pub source_fqn: Option<String>,
    pub severity: Severity,
    pub vector_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointKind {
    Http,
    Scheduled,
    QuartzJob,
    QuartzJobSpring,
    Mq,
    JobInterface,
}

impl EntryPointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryPointKind::Http => "http",
            EntryPointKind::Scheduled => "scheduled",
            EntryPointKind::QuartzJob => "quartz_job",
            EntryPointKind::QuartzJobSpring => "quartz_job_spring",
            EntryPointKind::Mq => "mq",
            EntryPointKind::JobInterface => "job_interface",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "http" => Some(EntryPointKind::Http),
            "scheduled" => Some(EntryPointKind::Scheduled),
            "quartz_job" => Some(EntryPointKind::QuartzJob),
            "quartz_job_spring" => Some(EntryPointKind::QuartzJobSpring),
            "mq" => Some(EntryPointKind::Mq),
            "job_interface" => Some(EntryPointKind::JobInterface),
            _ => None,
        }
    }
}

/// A symbol reachable from outside the JVM process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPointRecord {
    pub symbol_fqn: String,
    pub entry_type: EntryPointKind,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub cron_expression: Option<String>,
    pub mq_queue: Option<String>,
}

impl EntryPointRecord {
    pub fn new(symbol_fqn: impl Into<String>, entry_type: EntryPointKind) -> Self {
        Self {
            symbol_fqn: symbol_fqn.into(),
            entry_type,
            http_method: None,
            http_path: None,
            cron_expression: None,
            mq_queue: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPatternRecord {
    pub rule_id: String,
    pub from_fqn: String,
    pub to_fqn: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub detected_at: u64,
}

/// A vector-store id whose paired relational write failed, queued for
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVectorRecord {
    pub vector_id: String,
    pub target_fqn: String,
    pub reason: String,
    pub recorded_at: u64,
}
