use std::path::PathBuf;

/// Per-class analysis failure. Contained by batch analysis: one bad class is
/// reported alongside the successful rest.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: minerva_classfile::Error,
    },
}

impl AnalyzerError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            AnalyzerError::Io { path, .. } => path,
            AnalyzerError::Parse { path, .. } => path,
        }
    }
}
