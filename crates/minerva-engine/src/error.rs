#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] minerva_store::StoreError),

    #[error(transparent)]
    Rebuild(#[from] minerva_rebuild::RebuildError),

    #[error(transparent)]
    Vector(#[from] minerva_vector::VectorError),

    #[error("search query is empty")]
    EmptyQuery,

    #[error("job {job_id} is not available to run")]
    JobUnavailable { job_id: String },

    #[error("job {job_id} has unknown kind {kind}")]
    UnknownJobKind { job_id: String, kind: String },
}
