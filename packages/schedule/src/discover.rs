//! Schedule document discovery.
//!
//! Each first-level directory under the schedules root is an ingestion
//! batch; files directly under the root belong to [`DEFAULT_BATCH`].
//! Batches are walked recursively and every `.xml` file is returned. No
//! document is ever skipped or capped.

use std::path::{Path, PathBuf};

/// Batch name for documents placed directly under the schedules root.
pub const DEFAULT_BATCH: &str = "default";

/// A schedule document found on disk, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    /// Absolute or caller-relative path used to read the file.
    pub path: PathBuf,
    /// Path relative to the schedules root, `/`-separated.
    pub relative: String,
    /// Ingestion batch name.
    pub batch: String,
    /// Index of the batch in lexicographic batch order.
    pub batch_ordinal: usize,
    /// File name without directories.
    pub file_name: String,
}

/// Lists every schedule document under `root`, ordered by
/// (batch ordinal, relative path).
///
/// A missing `root` yields an empty list.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn discover_documents(root: &Path) -> Result<Vec<DocumentSource>, std::io::Error> {
    if !root.is_dir() {
        log::warn!("Schedules directory {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut found: Vec<(String, PathBuf, String)> = Vec::new();
    walk(root, root, &mut found)?;

    let mut batches: Vec<String> = found.iter().map(|(b, _, _)| b.clone()).collect();
    batches.sort();
    batches.dedup();

    let mut sources: Vec<DocumentSource> = found
        .into_iter()
        .map(|(batch, path, relative)| {
            let batch_ordinal = batches.binary_search(&batch).unwrap_or(0);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            DocumentSource {
                path,
                relative,
                batch,
                batch_ordinal,
                file_name,
            }
        })
        .collect();
    sources.sort_by(|a, b| {
        (a.batch_ordinal, &a.relative).cmp(&(b.batch_ordinal, &b.relative))
    });

    log::info!(
        "Discovered {} schedule documents in {} batches",
        sources.len(),
        batches.len()
    );
    Ok(sources)
}

fn walk(
    root: &Path,
    dir: &Path,
    found: &mut Vec<(String, PathBuf, String)>,
) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(root, &path, found)?;
            continue;
        }
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if !is_xml {
            continue;
        }

        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let batch = if parts.len() > 1 {
            parts[0].clone()
        } else {
            DEFAULT_BATCH.to_string()
        };
        found.push((batch, path, parts.join("/")));
    }
    Ok(())
}
