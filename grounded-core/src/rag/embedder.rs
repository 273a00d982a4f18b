//! Embedding provider contract.
//!
//! The pipeline never looks inside an embedding model. It relies only on
//! [`EmbeddingProvider::encode`]: a batch of texts in, one vector per text
//! out, same order, fixed dimension, and the same vector every time for the
//! same text.

use crate::provider::ProviderError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The backing provider failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider answered with the wrong number of vectors.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// The API response contained no embeddings.
    #[error("No embeddings returned")]
    NoEmbeddings,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Maps text to fixed-dimension dense vectors.
///
/// Implementations must be deterministic for a fixed model version, so that
/// retrieval ranking and answer validation are reproducible.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encodes `texts`, returning one vector per input in input order.
    async fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Identity of the embedding model, recorded alongside persisted indexes.
    fn model_id(&self) -> &str;

    /// Encodes a single text, checking that exactly one vector came back.
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.encode(&[text]).await?;
        ensure_count(1, &embeddings)?;
        embeddings
            .into_iter()
            .next()
            .ok_or(EmbedderError::NoEmbeddings)
    }
}

/// Checks that a batch response lines up with its request.
pub(crate) fn ensure_count(expected: usize, embeddings: &[Vec<f32>]) -> Result<()> {
    if embeddings.len() != expected {
        return Err(EmbedderError::CountMismatch {
            expected,
            actual: embeddings.len(),
        });
    }
    Ok(())
}
