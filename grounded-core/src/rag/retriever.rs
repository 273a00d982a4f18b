//! Question → ranked passages.

use super::embedder::{self, EmbedderError, EmbeddingProvider};
use crate::corpus::{Chunk, Corpus};
use crate::index::IndexError;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbedderError),
}

/// One retrieved passage with its distance to the question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub distance: f32,
    /// Stored embedding of the chunk, reused by the validator.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Passages ranked by ascending distance, at most `k` of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|hit| &hit.chunk)
    }

    pub fn chunk_ids(&self) -> Vec<u64> {
        self.hits.iter().map(|hit| hit.chunk.id).collect()
    }
}

/// Turns questions into ranked passages from a [`Corpus`].
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Embeds the question with the corpus' embedding model.
    pub async fn embed_question(&self, question: &str) -> embedder::Result<Vec<f32>> {
        let embedding = self.embedder.encode_one(question).await?;
        debug!(dimension = embedding.len(), "question embedded");
        Ok(embedding)
    }

    /// Finds the `k` nearest passages to an already embedded question.
    pub fn search(
        &self,
        corpus: &Corpus,
        question_embedding: &[f32],
        k: usize,
    ) -> Result<RetrievalResult, IndexError> {
        let neighbors = corpus.index().search(question_embedding, k)?;

        let hits = neighbors
            .iter()
            .map(|neighbor| {
                let (chunk, embedding) = corpus.resolve(neighbor).ok_or_else(|| {
                    IndexError::CorruptIndex(format!(
                        "no chunk at position {}",
                        neighbor.position
                    ))
                })?;
                Ok(RetrievalHit {
                    chunk: chunk.clone(),
                    distance: neighbor.distance,
                    embedding: embedding.to_vec(),
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        debug!(
            k,
            hits = hits.len(),
            nearest = ?hits.first().map(|h| h.distance),
            "retrieved passages"
        );
        Ok(RetrievalResult { hits })
    }

    /// Embeds `question` and returns its `k` nearest passages.
    ///
    /// Argument and empty-corpus checks run before the embedding call, so a
    /// request that cannot succeed costs nothing upstream.
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidArgument`] if `k` is zero
    /// - [`IndexError::EmptyIndex`] if the corpus has no passages
    /// - [`IndexError::DimensionMismatch`] if the question embedding does not
    ///   match the index
    /// - [`EmbedderError`] if the provider fails
    pub async fn retrieve(
        &self,
        corpus: &Corpus,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be greater than zero".to_string()).into());
        }
        if corpus.is_empty() {
            return Err(IndexError::EmptyIndex.into());
        }

        let embedding = self.embed_question(question).await?;
        Ok(self.search(corpus, &embedding, k)?)
    }
}
