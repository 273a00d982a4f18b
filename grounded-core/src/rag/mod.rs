//! Retrieval Augmented Generation (RAG) building blocks.
//!
//! # Overview
//!
//! A grounded answer goes through three stages, each backed by a module here:
//! 1. **Retrieval**: the question is embedded and its nearest passages are
//!    found in the corpus ([`retriever`])
//! 2. **Augmentation**: those passages are packed into a prompt under a
//!    character budget ([`prompt`])
//! 3. **Validation**: the generated answer is compared to the passages it was
//!    given and rejected if it drifts away from them ([`validator`])
//!
//! Generation itself sits behind [`crate::provider::GenerationClient`], and the
//! state machine tying the stages together lives in [`crate::pipeline`].
//!
//! # Indexing
//!
//! - [`ingest`]: collects text files and splits them into paragraph chunks
//! - [`indexer`]: embeds chunks in batches and saves the resulting corpus

pub mod embedder;
pub mod indexer;
pub mod ingest;
pub mod prompt;
pub mod retriever;
pub mod validator;

pub use embedder::{EmbedderError, EmbeddingProvider};
pub use indexer::{build_corpus, index_directory, IndexStats, IndexerError};
pub use ingest::{split_into_chunks, IngestError};
pub use prompt::{BuiltPrompt, PromptBuilder, PromptError};
pub use retriever::{RetrievalError, RetrievalHit, RetrievalResult, Retriever};
pub use validator::{cosine_similarity, SemanticValidator, Validation, ValidationError};
