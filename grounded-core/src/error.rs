//! Query-level error taxonomy.
//!
//! Every failure a question can run into is a [`QueryError`], and every
//! [`QueryError`] has exactly one [`ErrorKind`]. Kinds are stable and travel
//! unchanged to the service boundary.

use crate::index::IndexError;
use crate::provider::GenerationError;
use crate::rag::embedder::EmbedderError;
use crate::rag::prompt::PromptError;
use crate::rag::retriever::RetrievalError;
use crate::rag::validator::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty or malformed question.
    InputError,
    InvalidArgument,
    EmptyIndex,
    DimensionMismatch,
    CorruptIndex,
    EmbeddingError,
    GenerationTimeout,
    GenerationRateLimit,
    GenerationUpstream,
    PromptTooLarge,
    ZeroVector,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputError => "input_error",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::EmptyIndex => "empty_index",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::CorruptIndex => "corrupt_index",
            ErrorKind::EmbeddingError => "embedding_error",
            ErrorKind::GenerationTimeout => "generation_timeout",
            ErrorKind::GenerationRateLimit => "generation_rate_limit",
            ErrorKind::GenerationUpstream => "generation_upstream",
            ErrorKind::PromptTooLarge => "prompt_too_large",
            ErrorKind::ZeroVector => "zero_vector",
        }
    }

    /// Whether the caller, rather than the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::InputError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure while answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid question: {0}")]
    Input(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Input(_) => ErrorKind::InputError,
            QueryError::Index(e) => match e {
                IndexError::EmptyIndex => ErrorKind::EmptyIndex,
                IndexError::InvalidArgument(_) => ErrorKind::InvalidArgument,
                IndexError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
                IndexError::CorruptIndex(_) => ErrorKind::CorruptIndex,
            },
            QueryError::Embedding(_) => ErrorKind::EmbeddingError,
            QueryError::Generation(e) => match e {
                GenerationError::Timeout(_) => ErrorKind::GenerationTimeout,
                GenerationError::RateLimited(_) => ErrorKind::GenerationRateLimit,
                GenerationError::Upstream(_) => ErrorKind::GenerationUpstream,
            },
            QueryError::Prompt(e) => match e {
                PromptError::PromptTooLarge { .. } => ErrorKind::PromptTooLarge,
                PromptError::NoContext => ErrorKind::InvalidArgument,
            },
            QueryError::Validation(e) => match e {
                ValidationError::ZeroVector => ErrorKind::ZeroVector,
                ValidationError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
                ValidationError::NoEvidence => ErrorKind::InvalidArgument,
                ValidationError::NonFinite | ValidationError::Embedding(_) => {
                    ErrorKind::EmbeddingError
                }
            },
        }
    }
}

impl From<RetrievalError> for QueryError {
    fn from(error: RetrievalError) -> Self {
        match error {
            RetrievalError::Index(e) => QueryError::Index(e),
            RetrievalError::Embedding(e) => QueryError::Embedding(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::GenerationRateLimit).unwrap(),
            "\"generation_rate_limit\""
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::EmptyIndex).unwrap(),
            serde_json::json!(ErrorKind::EmptyIndex.as_str())
        );
        assert_eq!(ErrorKind::ZeroVector.to_string(), "zero_vector");
    }

    #[test]
    fn test_kinds_are_preserved() {
        let cases = [
            (QueryError::Input("empty".into()), ErrorKind::InputError),
            (QueryError::from(IndexError::EmptyIndex), ErrorKind::EmptyIndex),
            (
                QueryError::from(IndexError::DimensionMismatch { expected: 2, actual: 3 }),
                ErrorKind::DimensionMismatch,
            ),
            (
                QueryError::from(IndexError::CorruptIndex("bad".into())),
                ErrorKind::CorruptIndex,
            ),
            (
                QueryError::from(EmbedderError::NoEmbeddings),
                ErrorKind::EmbeddingError,
            ),
            (
                QueryError::from(GenerationError::Timeout("slow".into())),
                ErrorKind::GenerationTimeout,
            ),
            (
                QueryError::from(GenerationError::RateLimited("429".into())),
                ErrorKind::GenerationRateLimit,
            ),
            (
                QueryError::from(GenerationError::Upstream("boom".into())),
                ErrorKind::GenerationUpstream,
            ),
            (
                QueryError::from(PromptError::PromptTooLarge { required: 10, budget: 5 }),
                ErrorKind::PromptTooLarge,
            ),
            (QueryError::from(ValidationError::ZeroVector), ErrorKind::ZeroVector),
            (QueryError::from(ValidationError::NonFinite), ErrorKind::EmbeddingError),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn test_retrieval_error_unwraps() {
        let error = QueryError::from(RetrievalError::Index(IndexError::EmptyIndex));
        assert!(matches!(error, QueryError::Index(IndexError::EmptyIndex)));
    }

    #[test]
    fn test_only_input_is_client_error() {
        assert!(ErrorKind::InputError.is_client_error());
        assert!(!ErrorKind::EmptyIndex.is_client_error());
    }
}
