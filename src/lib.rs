//! grounded - Answers questions from your own documents, and says so when it can't
//!
//! This is the convenience wrapper crate that re-exports `grounded-core`.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! grounded = "0.1"
//! ```
//!
//! ```no_run
//! use grounded::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let corpus = Corpus::load(&config.storage.index_dir)?;
//! let pipeline = QueryPipeline::from_config(&config)?;
//!
//! match pipeline.run(&corpus, "What does the guide say about backups?").await {
//!     QueryOutcome::Completed { answer, .. } => println!("{}", answer.text),
//!     QueryOutcome::Rejected { validation, .. } => println!("unsure: {}", validation.reason),
//!     QueryOutcome::Failed { error, .. } => println!("{}: {error}", error.kind()),
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core
pub use grounded_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use async_trait::async_trait;
    pub use grounded_core::rag::embedder::EmbedderError;
    pub use grounded_core::*;
}
