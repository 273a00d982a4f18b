//! grounded-core - Grounded question answering over a local corpus
//!
//! Provides the components behind a retrieval-augmented answer service:
//! - Exact k-NN vector index and the aligned chunk corpus, with persistence
//! - Retrieval, budgeted prompt assembly and a semantic validation gate
//! - The query pipeline state machine and its error taxonomy
//! - Ollama-backed embedding and generation providers
//! - Configuration management
//! - Unix socket server API
//!
//! ## Primary API
//!
//! [`QueryPipeline::run`] answers one question against a [`Corpus`]
//! snapshot. [`Server`] exposes the same pipeline over a socket.

// Public modules
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod patterns;
pub mod pipeline;
pub mod provider;
pub mod rag;
pub mod server;

// Public exports
pub use config::{Config, ConfigError};
pub use corpus::{Chunk, ChunkStore, Corpus, CorpusHandle, StorageError};
pub use error::{ErrorKind, QueryError};
pub use index::{IndexError, Neighbor, VectorIndex};
pub use pipeline::{Answer, PipelineSettings, PipelineState, QueryOutcome, QueryPipeline};
pub use server::{Request, Response, Server};

// Provider exports
pub use provider::{GenerationClient, GenerationError, OllamaProvider, ProviderError};

// RAG exports
pub use rag::{
    EmbeddingProvider, PromptBuilder, RetrievalHit, RetrievalResult, Retriever, SemanticValidator,
    Validation,
};
