//! Shared extraction pipeline: classfiles → analyser → store.
//!
//! Symbols for the whole file set are upserted before any edge, so that
//! in-project call targets exist by the time the edge batch runs and only
//! genuinely external endpoints get filtered.

use std::path::{Path, PathBuf};

use minerva_analyzer::{keys, ClassAnalyser};
use minerva_model::{EdgeRecord, EntryPointKind, EntryPointRecord, SymbolRecord};
use minerva_store::GraphStore;

use crate::error::RebuildError;

#[derive(Debug, Default, Clone)]
pub struct ExtractReport {
    pub files_processed: usize,
    pub symbols_written: usize,
    pub edges_written: usize,
    pub edges_skipped_external: usize,
    pub entry_points_written: usize,
    pub failures: Vec<(PathBuf, String)>,
}

/// Analyse `files` and upsert everything into `store`. Per-class failures
/// are contained and reported; `should_cancel` is polled between phases.
pub fn extract_files(
    store: &GraphStore,
    analyser: &ClassAnalyser,
    files: &[PathBuf],
    should_cancel: &dyn Fn() -> bool,
) -> Result<ExtractReport, RebuildError> {
    let mut report = ExtractReport::default();
    let mut nodes: Vec<SymbolRecord> = Vec::new();
    let mut edges: Vec<EdgeRecord> = Vec::new();
    let mut hashes: Vec<(String, String)> = Vec::new();

    for path in files {
        if should_cancel() {
            return Err(RebuildError::Cancelled);
        }
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                report.failures.push((path.clone(), err.to_string()));
                continue;
            }
        };
        match analyser.analyse_bytes(path, &bytes) {
            Ok(analysis) => {
                report.files_processed += 1;
                hashes.push((
                    path.to_string_lossy().into_owned(),
                    blake3::hash(&bytes).to_hex().to_string(),
                ));
                nodes.extend(analysis.nodes);
                edges.extend(analysis.edges);
            }
            Err(err) => {
                tracing::warn!(
                    target = "minerva.rebuild",
                    path = %path.display(),
                    error = %err,
                    "classfile analysis failed; continuing extraction"
                );
                report.failures.push((path.clone(), err.to_string()));
            }
        }
    }

    if should_cancel() {
        return Err(RebuildError::Cancelled);
    }

    report.symbols_written = store.upsert_symbols(&nodes)?;
    let edge_report = store.insert_edges(&edges)?;
    report.edges_written = edge_report.written;
    report.edges_skipped_external = edge_report.skipped_missing_endpoint;

    let entry_points = derive_entry_points(&nodes);
    report.entry_points_written = store.upsert_entry_points(&entry_points)?;
    store.record_indexed_files(&hashes)?;

    Ok(report)
}

/// Entry-point rows from node attributes written by the analyser.
fn derive_entry_points(nodes: &[SymbolRecord]) -> Vec<EntryPointRecord> {
    let mut out = Vec::new();
    for node in nodes {
        if node.attributes.get_bool(keys::IS_ENTRY_POINT) != Some(true) {
            continue;
        }
        let Some(entry_type) = node
            .attributes
            .get_str(keys::ENTRY_POINT_TYPE)
            .and_then(EntryPointKind::parse)
        else {
            continue;
        };
        let mut record = EntryPointRecord::new(node.fqn.clone(), entry_type);
        record.http_method = node
            .attributes
            .get_str(keys::HTTP_METHOD)
            .map(str::to_string);
        record.http_path = node.attributes.get_str(keys::HTTP_PATH).map(str::to_string);
        record.cron_expression = node
            .attributes
            .get_str(keys::SCHEDULED_CRON)
            .map(str::to_string);
        out.push(record);
    }
    out
}

/// Content hash of one classfile, as stored in `indexed_files`.
pub(crate) fn hash_file(path: &Path) -> Result<String, RebuildError> {
    let bytes = std::fs::read(path).map_err(|source| RebuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
