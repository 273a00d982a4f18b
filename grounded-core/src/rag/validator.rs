//! Semantic validation gate.
//!
//! A generated answer is accepted only if, on average, it points in the same
//! direction as the passages it was generated from. The answer is embedded
//! with the same model that embedded the corpus, and its cosine similarity to
//! each passage used in the prompt is averaged. Answers that drift from the
//! evidence land below the threshold and are rejected.

use super::embedder::{EmbedderError, EmbeddingProvider};
use super::retriever::RetrievalHit;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ValidationError {
    /// Cosine similarity is undefined when either vector has zero magnitude.
    #[error("Cosine similarity is undefined for a zero-magnitude vector")]
    ZeroVector,

    #[error("Answer embedding has dimension {actual}, evidence has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No evidence passages to validate against")]
    NoEvidence,

    /// A vector held NaN or infinite components.
    #[error("Cosine similarity is undefined for non-finite vector components")]
    NonFinite,

    #[error(transparent)]
    Embedding(#[from] EmbedderError),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Outcome of the gate, with the numbers behind the decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub accepted: bool,
    pub average_similarity: f32,
    /// Per-passage similarities, in evidence order.
    pub similarities: Vec<f32>,
    pub threshold: f32,
    pub reason: String,
}

/// Computes `a · b / (|a| |b|)`, clamped to `[-1, 1]`.
///
/// Sums are accumulated in `f64`, so large finite components cannot overflow.
///
/// # Errors
///
/// - [`ValidationError::DimensionMismatch`] if the lengths differ
/// - [`ValidationError::ZeroVector`] if either vector has zero magnitude
/// - [`ValidationError::NonFinite`] if either vector has a NaN or infinite component
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ValidationError::DimensionMismatch {
            expected: b.len(),
            actual: a.len(),
        });
    }

    let dot_product: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let magnitude_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let magnitude_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Err(ValidationError::ZeroVector);
    }

    let similarity = dot_product / magnitude_a / magnitude_b;
    if !similarity.is_finite() {
        return Err(ValidationError::NonFinite);
    }

    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Mean cosine similarity of `answer` to every evidence vector.
///
/// Returns the mean and the individual similarities.
pub fn score<'a, I>(answer: &[f32], evidence: I) -> Result<(f32, Vec<f32>)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let similarities = evidence
        .into_iter()
        .map(|e| cosine_similarity(answer, e))
        .collect::<Result<Vec<f32>>>()?;
    if similarities.is_empty() {
        return Err(ValidationError::NoEvidence);
    }

    let average = similarities.iter().sum::<f32>() / similarities.len() as f32;
    Ok((average.clamp(-1.0, 1.0), similarities))
}

/// Accept/reject gate for generated answers.
#[derive(Clone)]
pub struct SemanticValidator {
    embedder: Arc<dyn EmbeddingProvider>,
    max_answer_chars: usize,
}

impl SemanticValidator {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, max_answer_chars: usize) -> Self {
        Self {
            embedder,
            max_answer_chars,
        }
    }

    /// Scores `answer_text` against the passages that were used in the prompt.
    ///
    /// The answer is accepted when its average similarity reaches `threshold`
    /// and it is no longer than the configured maximum. For fixed inputs,
    /// raising `threshold` can only turn an acceptance into a rejection.
    pub async fn validate(
        &self,
        answer_text: &str,
        evidence: &[RetrievalHit],
        threshold: f32,
    ) -> Result<Validation> {
        if evidence.is_empty() {
            return Err(ValidationError::NoEvidence);
        }

        let answer_embedding = self.embedder.encode_one(answer_text).await?;

        let (average_similarity, similarities) = score(
            &answer_embedding,
            evidence.iter().map(|hit| hit.embedding.as_slice()),
        )?;

        let answer_chars = answer_text.chars().count();
        let (accepted, reason) = if answer_chars > self.max_answer_chars {
            (
                false,
                format!(
                    "answer is {answer_chars} characters, above the limit of {}",
                    self.max_answer_chars
                ),
            )
        } else if average_similarity >= threshold {
            (true, "answer is grounded in the retrieved context".to_string())
        } else {
            (
                false,
                format!(
                    "average similarity {average_similarity:.3} is below {threshold}; \
                     the answer may not be grounded in the retrieved context"
                ),
            )
        };

        debug!(
            accepted,
            average_similarity,
            threshold,
            passages = similarities.len(),
            "validated answer"
        );

        Ok(Validation {
            accepted,
            average_similarity,
            similarities,
            threshold,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use crate::rag::embedder;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn encode(&self, texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn hit(id: u64, embedding: Vec<f32>) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk::new(id, "doc.txt", id as u32, format!("chunk{id}")),
            distance: 0.0,
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]).unwrap(), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]).unwrap(), -1.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert!(matches!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]),
            Err(ValidationError::ZeroVector)
        ));
    }

    #[test]
    fn test_cosine_similarity_large_components() {
        let orthogonal = cosine_similarity(&[1e20, 1e20], &[1e20, -1e20]).unwrap();
        assert!(orthogonal.abs() < 1e-6);
        let parallel = cosine_similarity(&[3e38, 3e38], &[1e30, 1e30]).unwrap();
        assert!((parallel - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_non_finite() {
        assert!(matches!(
            cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]),
            Err(ValidationError::NonFinite)
        ));
        assert!(matches!(
            cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 0.0]),
            Err(ValidationError::NonFinite)
        ));
    }

    #[test]
    fn test_score_averages() {
        let (average, sims) = score(
            &[1.0, 0.0],
            [&[1.0, 0.0][..], &[0.0, 1.0][..]],
        )
        .unwrap();
        assert_eq!(sims, vec![1.0, 0.0]);
        assert_eq!(average, 0.5);
    }

    #[tokio::test]
    async fn test_rejects_below_threshold() {
        // Unit answer vector with cosine 0.6 to chunk0 and 0.3 to chunk2.
        let answer = vec![0.6, 0.8];
        let chunk0 = vec![1.0, 0.0];
        let y = 0.3f32;
        let chunk2 = vec![0.6 * y - 0.8 * (1.0 - y * y).sqrt(), 0.8 * y + 0.6 * (1.0 - y * y).sqrt()];

        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(answer)), 5000);
        let validation = validator
            .validate("answer", &[hit(0, chunk0), hit(2, chunk2)], 0.5)
            .await
            .unwrap();

        assert!(!validation.accepted);
        assert!((validation.similarities[0] - 0.6).abs() < 1e-5);
        assert!((validation.similarities[1] - 0.3).abs() < 1e-5);
        assert!((validation.average_similarity - 0.45).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_accepts_at_threshold() {
        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), 5000);
        let validation = validator
            .validate("answer", &[hit(0, vec![1.0, 0.0])], 1.0)
            .await
            .unwrap();
        assert!(validation.accepted);
    }

    #[tokio::test]
    async fn test_large_orthogonal_answer_is_rejected() {
        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(vec![1e20, 1e20])), 5000);
        let validation = validator
            .validate("answer", &[hit(0, vec![1e20, -1e20])], 0.99)
            .await
            .unwrap();
        assert!(!validation.accepted);
        assert!(validation.average_similarity.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rejects_overlong_answer() {
        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), 5);
        let validation = validator
            .validate("far too long", &[hit(0, vec![1.0, 0.0])], 0.15)
            .await
            .unwrap();
        assert!(!validation.accepted);
        assert_eq!(validation.average_similarity, 1.0);
        assert!(validation.reason.contains("limit"));
    }

    #[tokio::test]
    async fn test_zero_answer_embedding() {
        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(vec![0.0, 0.0])), 5000);
        let err = validator
            .validate("answer", &[hit(0, vec![1.0, 0.0])], 0.15)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::ZeroVector));
    }

    #[tokio::test]
    async fn test_no_evidence() {
        let validator = SemanticValidator::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), 5000);
        let err = validator.validate("answer", &[], 0.15).await.unwrap_err();
        assert!(matches!(err, ValidationError::NoEvidence));
    }
}
