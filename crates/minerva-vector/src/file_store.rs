use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::VectorError;
use crate::util::{atomic_write, SNAPSHOT_LIMIT_BYTES};
use crate::{Result, VectorMatch, VectorMetadata, VectorStore};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

/// File-backed vector store: an in-memory map persisted as a bincode
/// snapshot on every mutation. Search is brute-force cosine similarity,
/// adequate for per-project indexes; swap in an ANN-backed store behind the
/// same trait when corpora outgrow it.
pub struct FileVectorStore {
    path: PathBuf,
    inner: RwLock<HashMap<String, Entry>>,
}

impl FileVectorStore {
    /// Open (or create) the snapshot at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > SNAPSHOT_LIMIT_BYTES => {
                return Err(VectorError::CorruptSnapshot {
                    path,
                    message: format!("snapshot exceeds {SNAPSHOT_LIMIT_BYTES} byte limit"),
                });
            }
            Ok(_) => {
                let bytes = std::fs::read(&path).map_err(|source| VectorError::Io {
                    path: path.clone(),
                    source,
                })?;
                let snapshot: Snapshot =
                    bincode::deserialize(&bytes).map_err(|err| VectorError::CorruptSnapshot {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(VectorError::CorruptSnapshot {
                        path,
                        message: format!(
                            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                            snapshot.version
                        ),
                    });
                }
                snapshot.entries
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(VectorError::Io { path, source }),
        };

        Ok(Self {
            path,
            inner: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Entry>) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: entries.clone(),
        };
        let bytes = bincode::serialize(&snapshot).map_err(|err| VectorError::CorruptSnapshot {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        atomic_write(&self.path, &bytes)
    }
}

impl VectorStore for FileVectorStore {
    fn add(&self, id: &str, embedding: &[f32], metadata: VectorMetadata) -> Result<()> {
        if embedding.is_empty() {
            return Err(VectorError::EmptyInput);
        }
        let mut entries = self.inner.write();
        if let Some(existing) = entries.values().next() {
            if existing.embedding.len() != embedding.len() {
                return Err(VectorError::DimensionMismatch {
                    expected: existing.embedding.len(),
                    found: embedding.len(),
                });
            }
        }
        entries.insert(
            id.to_string(),
            Entry {
                embedding: embedding.to_vec(),
                metadata,
            },
        );
        self.persist(&entries)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut entries = self.inner.write();
        // Idempotent: deleting an unknown id is a no-op.
        if entries.remove(id).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.inner.read().contains_key(id))
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.inner.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        if query.is_empty() {
            return Err(VectorError::EmptyInput);
        }
        let entries = self.inner.read();
        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                score: cosine(query, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(k);
        Ok(matches)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().len())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> FileVectorStore {
        FileVectorStore::open(dir.path().join("vectors.bin")).unwrap()
    }

    #[test]
    fn add_search_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.add("a", &[1.0, 0.0], VectorMetadata::new()).unwrap();
        s.add("b", &[0.0, 1.0], VectorMetadata::new()).unwrap();

        let matches = s.search(&[1.0, 0.1], 1).unwrap();
        assert_eq!(matches[0].id, "a");

        s.delete("a").unwrap();
        assert!(!s.contains("a").unwrap());
        // Idempotent delete.
        s.delete("a").unwrap();
        assert_eq!(s.len().unwrap(), 1);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        {
            let s = FileVectorStore::open(&path).unwrap();
            let mut meta = VectorMetadata::new();
            meta.insert("fqn".into(), "com.test.A".into());
            s.add("a", &[0.5, 0.5], meta).unwrap();
        }
        let reopened = FileVectorStore::open(&path).unwrap();
        assert!(reopened.contains("a").unwrap());
        let matches = reopened.search(&[0.5, 0.5], 1).unwrap();
        assert_eq!(matches[0].metadata.get("fqn").map(String::as_str), Some("com.test.A"));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.add("a", &[1.0, 0.0], VectorMetadata::new()).unwrap();
        assert!(matches!(
            s.add("b", &[1.0, 0.0, 0.0], VectorMetadata::new()),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn empty_query_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        assert!(matches!(s.search(&[], 5), Err(VectorError::EmptyInput)));
    }
}
