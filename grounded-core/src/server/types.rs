use crate::corpus::Corpus;
use crate::error::ErrorKind;
use crate::pipeline::QueryOutcome;
use crate::rag::retriever::RetrievalResult;
use crate::rag::validator::Validation;
use serde::{Deserialize, Serialize};

/// Kind reported when the validator turns an answer down.
pub const VALIDATION_REJECTION: &str = "validation_rejection";

/// Request from client to server, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ask { question: String },
    /// Reload the corpus from the index directory and swap it in.
    Reload,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    ClientError,
    GatewayError,
    ServerError,
}

impl ResponseStatus {
    /// HTTP-style status code for the outcome class.
    pub fn code(&self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::ClientError => 400,
            ResponseStatus::GatewayError => 502,
            ResponseStatus::ServerError => 500,
        }
    }
}

/// A retrieved passage as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_name: String,
    pub chunk_index: u32,
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    pub status: ResponseStatus,
    pub answer: String,
    pub average_similarity: f32,
    pub retrieved_chunks: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsPayload {
    pub status: ResponseStatus,
    pub chunks: usize,
    pub dimension: usize,
    pub embedding_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub status: ResponseStatus,
    pub code: u16,
    pub kind: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

/// Response sent back to the client, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Answer(AnswerPayload),
    Stats(StatsPayload),
    Error(ErrorPayload),
}

impl Response {
    pub fn status(&self) -> ResponseStatus {
        match self {
            Response::Answer(p) => p.status,
            Response::Stats(p) => p.status,
            Response::Error(p) => p.status,
        }
    }

    pub fn stats(corpus: &Corpus) -> Self {
        Response::Stats(StatsPayload {
            status: ResponseStatus::Ok,
            chunks: corpus.len(),
            dimension: corpus.index().dimension(),
            embedding_model: corpus.embedding_model().to_string(),
        })
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_client_error() {
            ResponseStatus::ClientError
        } else {
            ResponseStatus::ServerError
        };
        Response::Error(ErrorPayload {
            status,
            code: status.code(),
            kind: kind.as_str().to_string(),
            message: message.into(),
            validation: None,
        })
    }

    /// A request line that could not be parsed.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::InputError, message)
    }

    pub fn rejected(validation: Validation) -> Self {
        let status = ResponseStatus::GatewayError;
        Response::Error(ErrorPayload {
            status,
            code: status.code(),
            kind: VALIDATION_REJECTION.to_string(),
            message: format!("Answer failed validation: {}", validation.reason),
            validation: Some(validation),
        })
    }
}

impl From<QueryOutcome> for Response {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Completed {
                answer, retrieval, ..
            } => Response::Answer(AnswerPayload {
                status: ResponseStatus::Ok,
                answer: answer.text,
                average_similarity: answer.average_similarity,
                retrieved_chunks: retrieved_chunks(retrieval),
            }),
            QueryOutcome::Rejected { validation, .. } => Response::rejected(validation),
            QueryOutcome::Failed { error, .. } => Response::error(error.kind(), error.to_string()),
        }
    }
}

fn retrieved_chunks(retrieval: RetrievalResult) -> Vec<RetrievedChunk> {
    retrieval
        .hits
        .into_iter()
        .map(|hit| RetrievedChunk {
            document_name: hit.chunk.document_name,
            chunk_index: hit.chunk.chunk_index,
            text: hit.chunk.text,
            distance: hit.distance,
        })
        .collect()
}
