//! Offline corpus building: chunks in, embedded [`Corpus`] out.

use super::embedder::{self, EmbedderError, EmbeddingProvider};
use super::ingest::{self, IngestError};
use crate::config::Config;
use crate::corpus::{Chunk, Corpus, StorageError};
use crate::index::IndexError;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No chunks found under {0}")]
    NoChunks(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

/// Summary of a completed indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Embeds `chunks` in batches of `batch_size` and builds a corpus from them.
///
/// Embeddings keep chunk order, so position `i` in the index always refers
/// to `chunks[i]`.
pub async fn build_corpus(
    embedder: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Corpus> {
    let batch_size = batch_size.max(1);
    let mut embeddings = Vec::with_capacity(chunks.len());

    for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.encode(&texts).await?;
        embedder::ensure_count(texts.len(), &vectors)?;
        debug!(batch = batch_number, size = texts.len(), "embedded batch");
        embeddings.extend(vectors);
    }

    Ok(Corpus::build(embedder.model_id(), chunks, embeddings)?)
}

/// Ingests `docs_dir`, embeds every chunk, and saves the corpus to the
/// configured index directory.
pub async fn index_directory(
    embedder: &dyn EmbeddingProvider,
    docs_dir: impl AsRef<Path>,
    config: &Config,
) -> Result<IndexStats> {
    let docs_dir = docs_dir.as_ref();
    let documents = ingest::collect_documents(docs_dir, &config.ingestion).await?;
    let chunks = ingest::chunk_documents(&documents, config.ingestion.chunk_size);
    if chunks.is_empty() {
        return Err(IndexerError::NoChunks(docs_dir.display().to_string()));
    }

    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        model = embedder.model_id(),
        "embedding corpus"
    );
    let corpus = build_corpus(embedder, chunks, config.embedding.batch_size).await?;

    let index_dir = config.storage.index_dir.clone();
    let stats = IndexStats {
        documents: documents.len(),
        chunks: corpus.len(),
        dimension: corpus.index().dimension(),
    };
    tokio::task::spawn_blocking(move || corpus.save(index_dir))
        .await
        .map_err(|e| StorageError::Io {
            path: config.storage.index_dir.clone(),
            source: std::io::Error::other(e),
        })??;

    info!(
        chunks = stats.chunks,
        dimension = stats.dimension,
        path = %config.storage.index_dir.display(),
        "index saved"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds text as `[len, 1]` and records batch sizes.
    struct LengthEmbedder {
        batches: Mutex<Vec<usize>>,
    }

    impl LengthEmbedder {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn encode(&self, texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect())
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk::new(i as u64, "doc.txt", i as u32, "x".repeat(i + 1)))
            .collect()
    }

    #[tokio::test]
    async fn test_build_corpus_batches_in_order() {
        let embedder = LengthEmbedder::new();
        let corpus = build_corpus(&embedder, chunks(5), 2).await.unwrap();

        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(corpus.len(), 5);
        assert_eq!(corpus.embedding_model(), "length");
        assert_eq!(corpus.index().row(3), Some(&[4.0, 1.0][..]));
    }

    #[tokio::test]
    async fn test_build_corpus_count_mismatch() {
        struct ShortEmbedder;

        #[async_trait]
        impl EmbeddingProvider for ShortEmbedder {
            async fn encode(&self, _texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
                Ok(vec![vec![1.0]])
            }

            fn model_id(&self) -> &str {
                "short"
            }
        }

        let err = build_corpus(&ShortEmbedder, chunks(3), 8).await.unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Embedding(EmbedderError::CountMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_index_directory_saves_loadable_corpus() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("a.txt"), "first\n\nsecond").unwrap();

        let mut config = Config::default();
        config.ingestion.chunk_size = 6;
        config.storage.index_dir = store.path().join("index");

        let stats = index_directory(&LengthEmbedder::new(), docs.path(), &config)
            .await
            .unwrap();
        assert_eq!(
            stats,
            IndexStats {
                documents: 1,
                chunks: 2,
                dimension: 2
            }
        );

        let corpus = Corpus::load(&config.storage.index_dir).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.chunks().get(1).unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_index_directory_without_documents() {
        let docs = tempfile::tempdir().unwrap();
        let err = index_directory(&LengthEmbedder::new(), docs.path(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::NoChunks(_)));
    }
}
