//! Document loading and paragraph-respecting chunking.
//!
//! This module turns a folder of text files into the ordered [`Chunk`]
//! records the index is built from:
//! - Recursively collect text files from a directory, in sorted path order
//! - Split each document into chunks that keep paragraphs whole when possible
//! - Number chunks by their position in the resulting corpus

use crate::config::IngestionConfig;
use crate::corpus::Chunk;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors that can occur during document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// An I/O error occurred while reading files or directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// A document that has been collected and read.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the collection root, with `/` separators.
    pub name: String,
    pub content: String,
}

/// Splits text into chunks of at most `max_chars` characters.
///
/// Paragraphs (separated by blank lines) are packed together, joined by a
/// blank line, while the packed chunk stays within `max_chars`. A paragraph
/// longer than `max_chars` is emitted on its own, hard-split every
/// `max_chars` characters. Blank paragraphs are dropped.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim_matches('\n');
        if paragraph.trim().is_empty() {
            continue;
        }
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = paragraph.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
        } else if current.is_empty() {
            current.push_str(paragraph);
            current_len = paragraph_len;
        } else if current_len + 2 + paragraph_len > max_chars {
            chunks.push(std::mem::replace(&mut current, paragraph.to_string()));
            current_len = paragraph_len;
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_len += 2 + paragraph_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Recursively collects every ingestible document under `dir_path`.
///
/// Files are filtered by extension and exclude patterns, unreadable or
/// non-UTF-8 files are skipped with a warning, and the result is sorted by
/// name so the same folder always yields the same corpus order.
pub async fn collect_documents(
    dir_path: impl AsRef<Path>,
    config: &IngestionConfig,
) -> Result<Vec<SourceDocument>> {
    let root = dir_path.as_ref();
    if !fs::metadata(root).await?.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }

    let mut paths = Vec::new();
    collect_files_recursive(root, &mut paths, config).await?;
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match fs::read_to_string(&path).await {
            Ok(content) => documents.push(SourceDocument {
                name: document_name(root, &path),
                content,
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(documents)
}

/// Loads a folder and chunks every document into corpus order.
pub async fn load_chunks(
    dir_path: impl AsRef<Path>,
    config: &IngestionConfig,
) -> Result<Vec<Chunk>> {
    let documents = collect_documents(dir_path, config).await?;
    Ok(chunk_documents(&documents, config.chunk_size))
}

/// Chunks documents in order, numbering chunks by corpus position.
pub fn chunk_documents(documents: &[SourceDocument], chunk_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for document in documents {
        let pieces = split_into_chunks(&document.content, chunk_size);
        if pieces.is_empty() {
            warn!(document = %document.name, "document produced no chunks");
            continue;
        }
        debug!(document = %document.name, chunks = pieces.len(), "chunked document");

        for (chunk_index, text) in pieces.into_iter().enumerate() {
            let id = chunks.len() as u64;
            chunks.push(Chunk::new(id, document.name.clone(), chunk_index as u32, text));
        }
    }
    chunks
}

fn collect_files_recursive<'a>(
    dir: &'a Path,
    files: &'a mut Vec<PathBuf>,
    config: &'a IngestionConfig,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if should_exclude(&path, &config.exclude_patterns) {
                continue;
            }

            if entry.file_type().await?.is_dir() {
                collect_files_recursive(&path, files, config).await?;
            } else if is_ingestible(&path, &config.extensions) {
                files.push(path);
            }
        }

        Ok(())
    })
}

fn document_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks if a file should be ingested based on its extension.
///
/// If `extensions` is empty, all files are considered ingestible.
fn is_ingestible(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// A path is excluded if any component of its path matches an exclude pattern.
fn should_exclude(path: &Path, patterns: &[String]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| patterns.iter().any(|pattern| name.contains(pattern.as_str())))
        .unwrap_or(false)
}
