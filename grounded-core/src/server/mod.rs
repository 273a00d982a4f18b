//! Unix socket server answering questions over newline-delimited JSON.
//!
//! The server is organized into separate concerns:
//! - `types`: Protocol types for requests and responses
//! - `handler`: Routing requests to the pipeline and corpus management
//! - `transport`: Unix socket communication layer
//!
//! Each connection carries one request and receives one response. If the
//! client hangs up before the response is ready, the in-flight pipeline run
//! is dropped. Clients must keep their write side open until the response
//! arrives; a half-close counts as hanging up.

mod handler;
mod transport;
mod types;

pub use handler::RequestHandler;
pub use transport::{TransportError, UnixSocketTransport};
pub use types::{
    AnswerPayload, ErrorPayload, Request, Response, ResponseStatus, RetrievedChunk, StatsPayload,
    VALIDATION_REJECTION,
};

use crate::config::Config;
use crate::corpus::{Corpus, CorpusHandle, StorageError};
use crate::index::IndexError;
use crate::pipeline::QueryPipeline;
use crate::provider::ProviderError;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to load index: {0}")]
    Storage(#[from] StorageError),

    #[error("Index does not match the configured embedding model: {0}")]
    Model(#[from] IndexError),

    #[error("Failed to create provider: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Main server coordinating transport and request handling.
pub struct Server {
    handler: Arc<RequestHandler>,
    transport: UnixSocketTransport,
}

impl Server {
    pub fn new(handler: RequestHandler, transport: UnixSocketTransport) -> Self {
        Self {
            handler: Arc::new(handler),
            transport,
        }
    }

    /// Loads the persisted corpus and wires an Ollama-backed pipeline to it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let corpus = Corpus::load(&config.storage.index_dir)?;
        corpus.ensure_model(&config.embedding.model)?;
        info!(
            chunks = corpus.len(),
            dimension = corpus.index().dimension(),
            model = corpus.embedding_model(),
            "corpus loaded"
        );

        let pipeline = QueryPipeline::from_config(config)?;
        let handler = RequestHandler::new(
            pipeline,
            Arc::new(CorpusHandle::new(corpus)),
            &config.storage.index_dir,
            &config.embedding.model,
        );
        Ok(Self::new(
            handler,
            UnixSocketTransport::new(&config.server.socket_path),
        ))
    }

    pub async fn bind(&self) -> Result<UnixListener> {
        Ok(self.transport.bind().await?)
    }

    /// Binds the socket and serves until ctrl-c.
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Accepts connections on `listener` until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: UnixListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(socket = %self.transport.socket_path().display(), "server listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, handler).await {
                                warn!(error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
                _ = &mut shutdown => {
                    info!("shutting down");
                    self.transport.cleanup();
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handles a single client connection.
async fn handle_connection(
    stream: UnixStream,
    handler: Arc<RequestHandler>,
) -> std::result::Result<(), TransportError> {
    let mut conn = transport::connection(stream);

    let Some(line) = transport::read_line(&mut conn).await? else {
        return Ok(());
    };

    let response = tokio::select! {
        response = handler.handle_line(&line) => response,
        _ = transport::closed(&mut conn) => {
            debug!("client disconnected, dropping request");
            return Ok(());
        }
    };

    transport::write_response(&mut conn, &response).await
}
