use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("cannot embed empty input")]
    EmptyInput,

    #[error("embedding dimension mismatch: store has {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt vector snapshot at {path}: {message}")]
    CorruptSnapshot { path: PathBuf, message: String },

    #[error("embedding provider error: {0}")]
    Provider(String),
}
