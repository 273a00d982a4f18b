use super::types::{Request, Response};
use crate::corpus::{Corpus, CorpusHandle, StorageError};
use crate::error::{ErrorKind, QueryError};
use crate::pipeline::QueryPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Routes requests to the pipeline or to corpus management.
pub struct RequestHandler {
    pipeline: QueryPipeline,
    corpus: Arc<CorpusHandle>,
    index_dir: PathBuf,
    embedding_model: String,
}

impl RequestHandler {
    pub fn new(
        pipeline: QueryPipeline,
        corpus: Arc<CorpusHandle>,
        index_dir: impl Into<PathBuf>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            corpus,
            index_dir: index_dir.into(),
            embedding_model: embedding_model.into(),
        }
    }

    /// Parses a raw request line and handles it.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::malformed(format!("Malformed request: {e}")),
        }
    }

    /// Routes request to appropriate handler based on type.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ask { question } => self.handle_ask(&question).await,
            Request::Reload => self.handle_reload().await,
            Request::Stats => Response::stats(&self.corpus.snapshot()),
        }
    }

    async fn handle_ask(&self, question: &str) -> Response {
        // The snapshot pins this corpus for the whole run, even across a swap.
        let corpus = self.corpus.snapshot();
        self.pipeline.run(&corpus, question).await.into()
    }

    async fn handle_reload(&self) -> Response {
        let index_dir = self.index_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || Corpus::load(index_dir)).await;

        let corpus = match loaded {
            Ok(Ok(corpus)) => corpus,
            Ok(Err(e)) => {
                error!(error = %e, "reload failed");
                return Response::error(storage_kind(&e), format!("Reload failed: {e}"));
            }
            Err(e) => {
                error!(error = %e, "reload task failed");
                return Response::error(ErrorKind::CorruptIndex, format!("Reload failed: {e}"));
            }
        };

        if let Err(e) = corpus.ensure_model(&self.embedding_model) {
            error!(error = %e, "reload rejected");
            let e = QueryError::from(e);
            return Response::error(e.kind(), format!("Reload rejected: {e}"));
        }

        let response = Response::stats(&corpus);
        self.corpus.swap(corpus);
        info!(dir = %self.index_dir.display(), "corpus reloaded");
        response
    }
}

/// Kind reported for a corpus that could not be loaded.
fn storage_kind(error: &StorageError) -> ErrorKind {
    match error {
        StorageError::Index(e) => QueryError::from(e.clone()).kind(),
        StorageError::Io { .. } | StorageError::Manifest(_) => ErrorKind::CorruptIndex,
    }
}
