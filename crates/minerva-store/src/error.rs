use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store integrity violation: {0}")]
    Integrity(String),

    #[error("symbol {fqn} cannot change kind from {existing} to {attempted}")]
    KindTransition {
        fqn: String,
        existing: String,
        attempted: String,
    },

    #[error("migration v{version} failed: {message}")]
    Migration { version: i64, message: String },

    #[error("no valid database found after interrupted swap: {0}")]
    SwapUnrecoverable(String),

    #[error("vector store error: {0}")]
    Vector(#[from] minerva_vector::VectorError),

    #[error("job {job_id} is not in the expected state")]
    JobConflict { job_id: String },

    #[error(
        "orphan tracking failed for vector {vector_id} ({target_fqn}): {message}; \
         the vector may be leaked until manual reconciliation"
    )]
    OrphanTracking {
        vector_id: String,
        target_fqn: String,
        message: String,
    },
}
