//! Model provider layer.
//!
//! This module defines the generation contract consumed by the query
//! pipeline and ships an Ollama backend that serves both generation and
//! embeddings.

mod types;
pub mod ollama;

// Re-export common types
pub use types::{
    ChatRequest,
    EmbedRequest,
    EmbedResponse,
    GenerationClient,
    GenerationError,
    Message,
    ProviderError,
    Result,
};

// Re-export provider implementations
pub use ollama::OllamaProvider;
