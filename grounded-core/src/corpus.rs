//! Chunk records, the aligned corpus, and its on-disk layout.
//!
//! A [`Corpus`] pairs a [`VectorIndex`] with a [`ChunkStore`] so that row `i`
//! of the index and chunk `i` of the store always describe the same passage.
//! It is the unit that gets persisted, loaded and swapped.
//!
//! # Persisted layout
//!
//! An index directory holds two parallel artifacts:
//!
//! - `vectors.bin`: `N × D` little-endian `f32` values, row-major
//! - `chunks.json`: a manifest with the embedding model, `D`, `N`, a SHA-256
//!   checksum of `vectors.bin`, and the `N` chunk records in row order
//!
//! Both must be loaded together; [`Corpus::load`] refuses any pair that does
//! not line up.

use crate::index::{IndexError, Neighbor, VectorIndex};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const VECTORS_FILE: &str = "vectors.bin";
const MANIFEST_FILE: &str = "chunks.json";
const FORMAT_VERSION: u32 = 1;

/// Errors raised while saving or loading index artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A bounded span of source text, the unit of retrieval.
///
/// `id` is the chunk's position in its [`ChunkStore`] and in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub document_name: String,
    pub chunk_index: u32,
    pub text: String,
}

impl Chunk {
    pub fn new(
        id: u64,
        document_name: impl Into<String>,
        chunk_index: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            document_name: document_name.into(),
            chunk_index,
            text: text.into(),
        }
    }

    /// Human-readable origin, e.g. `manual.txt#3`.
    pub fn source(&self) -> String {
        format!("{}#{}", self.document_name, self.chunk_index)
    }
}

/// Ordered chunk records, positionally aligned with a [`VectorIndex`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    /// Wraps chunks whose ids equal their positions.
    pub fn new(chunks: Vec<Chunk>) -> std::result::Result<Self, IndexError> {
        if let Some((position, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| chunk.id != *position as u64)
        {
            return Err(IndexError::CorruptIndex(format!(
                "chunk at position {position} carries id {}",
                chunk.id
            )));
        }
        Ok(Self { chunks })
    }

    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}

/// The aligned vector index and chunk store for one embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    embedding_model: String,
    index: VectorIndex,
    chunks: ChunkStore,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    embedding_model: String,
    dimension: usize,
    vector_count: usize,
    checksum: String,
    chunks: Vec<Chunk>,
}

impl Corpus {
    /// Builds a corpus from chunks and their embeddings, both in corpus order.
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidArgument`] if the two sequences differ in length
    /// - [`IndexError::DimensionMismatch`] if the embeddings disagree on dimension
    /// - [`IndexError::CorruptIndex`] if a chunk id differs from its position
    pub fn build(
        embedding_model: impl Into<String>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> std::result::Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::InvalidArgument(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        Ok(Self {
            embedding_model: embedding_model.into(),
            index: VectorIndex::build(embeddings)?,
            chunks: ChunkStore::new(chunks)?,
        })
    }

    /// A corpus with no passages. Every search against it fails with
    /// [`IndexError::EmptyIndex`].
    pub fn empty(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            index: VectorIndex::default(),
            chunks: ChunkStore::default(),
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk and stored embedding behind a search hit.
    pub fn resolve(&self, neighbor: &Neighbor) -> Option<(&Chunk, &[f32])> {
        Some((
            self.chunks.get(neighbor.position)?,
            self.index.row(neighbor.position)?,
        ))
    }

    /// Fails if the corpus was embedded by a different model than `model_id`.
    pub fn ensure_model(&self, model_id: &str) -> std::result::Result<(), IndexError> {
        if self.embedding_model != model_id {
            return Err(IndexError::CorruptIndex(format!(
                "index was built with embedding model '{}', provider uses '{}'",
                self.embedding_model, model_id
            )));
        }
        Ok(())
    }

    /// Writes `vectors.bin` and `chunks.json` into `dir`.
    ///
    /// Each artifact is written to a temporary file and renamed into place.
    /// The manifest carries the blob checksum, so a reader never accepts a
    /// blob from one save with a manifest from another.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

        let blob = self.index.to_bytes();
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimension: self.index.dimension(),
            vector_count: self.index.len(),
            checksum: checksum(&blob),
            chunks: self.chunks.chunks.clone(),
        };
        let manifest = serde_json::to_vec_pretty(&manifest)?;

        write_atomically(&dir.join(VECTORS_FILE), &blob)?;
        write_atomically(&dir.join(MANIFEST_FILE), &manifest)?;

        info!(
            dir = %dir.display(),
            chunks = self.len(),
            dimension = self.index.dimension(),
            "saved index"
        );
        Ok(())
    }

    /// Loads and cross-checks the two artifacts in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CorruptIndex`] (wrapped in [`StorageError::Index`])
    /// when the checksum, the row count, the chunk count or the chunk ids do
    /// not agree.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let vectors_path = dir.join(VECTORS_FILE);
        let manifest_path = dir.join(MANIFEST_FILE);

        let blob = fs::read(&vectors_path).map_err(|e| io_error(&vectors_path, e))?;
        let manifest = fs::read(&manifest_path).map_err(|e| io_error(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_slice(&manifest)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        if checksum(&blob) != manifest.checksum {
            return Err(corrupt("vector blob checksum does not match manifest"));
        }

        let index = VectorIndex::from_bytes(manifest.dimension, &blob)?;
        if index.len() != manifest.vector_count || index.len() != manifest.chunks.len() {
            return Err(corrupt(format!(
                "{} vectors but {} chunks (manifest declares {})",
                index.len(),
                manifest.chunks.len(),
                manifest.vector_count
            )));
        }
        let chunks = ChunkStore::new(manifest.chunks)?;

        debug!(
            dir = %dir.display(),
            chunks = chunks.len(),
            dimension = index.dimension(),
            model = %manifest.embedding_model,
            "loaded index"
        );

        Ok(Self {
            embedding_model: manifest.embedding_model,
            index,
            chunks,
        })
    }
}

/// Process-wide reference to the current [`Corpus`].
///
/// Readers call [`snapshot`](Self::snapshot) once per request and keep that
/// `Arc` until they finish, so a concurrent [`swap`](Self::swap) never hands
/// them a mix of old and new data. Swapping takes no lock visible to readers.
pub struct CorpusHandle {
    current: ArcSwap<Corpus>,
}

impl CorpusHandle {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: ArcSwap::from_pointee(corpus),
        }
    }

    pub fn snapshot(&self) -> Arc<Corpus> {
        self.current.load_full()
    }

    /// Publishes a fully built corpus and returns the one it replaced.
    pub fn swap(&self, corpus: Corpus) -> Arc<Corpus> {
        let previous = self.current.swap(Arc::new(corpus));
        info!(
            previous_chunks = previous.len(),
            chunks = self.current.load().len(),
            "swapped corpus"
        );
        previous
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(message: impl Into<String>) -> StorageError {
    StorageError::Index(IndexError::CorruptIndex(message.into()))
}
