use std::fs;
use std::io;
use std::path::Path;

use crate::error::RebuildError;

/// Atomically move `from` onto `to`, replacing any existing file.
///
/// On Unix `rename` already replaces atomically. On Windows it refuses to
/// overwrite, so the destination is removed and the rename retried; the
/// short non-atomic window there is why the swap protocol keeps a valid
/// sibling at every step rather than relying on this primitive alone.
pub fn replace_file(from: &Path, to: &Path) -> Result<(), RebuildError> {
    let mut attempts = 0usize;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows)
                    && (err.kind() == io::ErrorKind::AlreadyExists || to.exists())
                    && attempts < 16 =>
            {
                attempts += 1;
                match fs::remove_file(to) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => {
                        return Err(RebuildError::Io {
                            path: to.to_path_buf(),
                            source: remove_err,
                        })
                    }
                }
            }
            Err(source) => {
                return Err(RebuildError::Io {
                    path: from.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// Remove SQLite sidecar files (`-wal`, `-shm`) left next to a database
/// file. Best-effort; a clean close removes them already.
pub(crate) fn remove_sidecars(db_path: &Path) {
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        let sidecar = db_path.with_file_name(name);
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(
                    target = "minerva.rebuild",
                    path = %sidecar.display(),
                    error = %err,
                    "failed to remove sqlite sidecar"
                );
            }
        }
    }
}
