//! Filesystem ingestion.
//!
//! Turns a file or directory into documents and runs each through the
//! pipeline. Directories are walked recursively with include/exclude glob
//! filtering; unreadable or non-UTF-8 files are skipped with a warning,
//! never a failure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use walkdir::WalkDir;

use graphmill_core::models::{Document, DocumentMeta, ProcessingResult};

use crate::config::IngestConfig;
use crate::pipeline::PipelineOrchestrator;

/// Ingest a file or directory tree. Returns one result per document.
pub async fn ingest_path(
    orchestrator: &PipelineOrchestrator,
    path: &Path,
    config: &IngestConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ProcessingResult>> {
    let files = collect_files(path, config)?;
    let mut results = Vec::with_capacity(files.len());

    for file in files {
        if cancel.is_cancelled() {
            break;
        }
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let doc = document_from_file(&file, content);
        results.push(orchestrator.process(doc, cancel).await);
    }

    Ok(results)
}

fn document_from_file(path: &Path, content: String) -> Document {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string());
    Document::new(
        content,
        DocumentMeta {
            title,
            filename,
            content_type: None,
            size_bytes: 0,
            tags: Vec::new(),
        },
    )
}

/// Resolve the files to ingest: a single file as-is, a directory via
/// recursive walk with glob filtering.
fn collect_files(path: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("path does not exist: {}", path.display());
    }

    let include = build_globset(&config.include_globs)
        .context("invalid ingest.include_globs pattern")?;
    let exclude = build_globset(&config.exclude_globs)
        .context("invalid ingest.exclude_globs pattern")?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        if include.is_match(relative) && !exclude.is_match(relative) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_filters_by_glob() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        std::fs::write(tmp.path().join("c.bin"), "gamma").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/d.md"), "delta").unwrap();

        let config = IngestConfig {
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec!["sub/**".to_string()],
        };
        let files = collect_files(tmp.path(), &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
    }

    #[test]
    fn test_single_file_passes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("only.rs");
        std::fs::write(&file, "fn main() {}").unwrap();

        let files = collect_files(&file, &IngestConfig::default()).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_document_from_file_sets_metadata() {
        let doc = document_from_file(Path::new("/tmp/notes/summary.md"), "body".to_string());
        assert_eq!(doc.metadata.filename.as_deref(), Some("summary.md"));
        assert_eq!(doc.metadata.title.as_deref(), Some("summary"));
        assert_eq!(doc.metadata.size_bytes, 4);
    }

    #[test]
    fn test_missing_path_errors() {
        assert!(collect_files(Path::new("/definitely/not/here"), &IngestConfig::default()).is_err());
    }
}
