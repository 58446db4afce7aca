use std::path::PathBuf;

use crate::shadow::IntegrityReport;

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Store(#[from] minerva_store::StoreError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {root}: {message}")]
    Walk { root: PathBuf, message: String },

    #[error("integrity suite rejected the new database: {0:?}")]
    IntegrityFailed(IntegrityReport),

    #[error("swap failed ({message}); serving database recovered: {recovered}")]
    SwapFailed { message: String, recovered: bool },

    #[error("rebuild cancelled")]
    Cancelled,
}
