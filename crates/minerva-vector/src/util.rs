use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::VectorError;
use crate::Result;

/// Hard cap on snapshot payloads read back from disk. Corruption should
/// degrade to an error, not an out-of-memory crash on a bad length prefix.
pub(crate) const SNAPSHOT_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` atomically: unique temp file in the same
/// directory, fsync, rename. On Windows rename does not overwrite, so the
/// destination is removed and the rename retried.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| VectorError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let write_result = file
        .write_all(bytes)
        .and_then(|()| file.sync_all());
    if let Err(source) = write_result {
        drop(file);
        remove_best_effort(&tmp_path);
        return Err(VectorError::Io {
            path: tmp_path,
            source,
        });
    }
    drop(file);

    let mut attempts = 0usize;
    loop {
        match fs::rename(&tmp_path, path) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows)
                    && (err.kind() == io::ErrorKind::AlreadyExists || path.exists())
                    && attempts < 16 =>
            {
                attempts += 1;
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => {
                        remove_best_effort(&tmp_path);
                        return Err(VectorError::Io {
                            path: path.to_path_buf(),
                            source: remove_err,
                        });
                    }
                }
            }
            Err(source) => {
                remove_best_effort(&tmp_path);
                return Err(VectorError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> Result<(PathBuf, fs::File)> {
    let file_name = dest.file_name().ok_or_else(|| VectorError::Io {
        path: dest.to_path_buf(),
        source: io::Error::other("destination path has no file name"),
    })?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(VectorError::Io {
                    path: tmp_path,
                    source,
                })
            }
        }
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::debug!(
                target = "minerva.vector",
                path = %path.display(),
                error = %err,
                "failed to remove temporary file"
            );
        }
    }
}
