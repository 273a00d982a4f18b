//! The query pipeline: one question in, one terminal outcome out.
//!
//! A run walks a fixed sequence of states:
//!
//! ```text
//! Received → Embedding → Retrieving → Prompting → Generating → Validating
//!                                                                  │
//!                                      Completed | Rejected ◄──────┘
//! ```
//!
//! Any failing step ends the run in `Failed`, remembering the state it failed
//! in. A rejected answer is an outcome, not an error. Steps are sequential
//! `await`s, so dropping the future returned by [`QueryPipeline::run`]
//! cancels whatever call is in flight.

use crate::config::Config;
use crate::corpus::Corpus;
use crate::error::QueryError;
use crate::provider::{GenerationClient, OllamaProvider, ProviderError};
use crate::rag::embedder::EmbeddingProvider;
use crate::rag::prompt::PromptBuilder;
use crate::rag::retriever::{RetrievalResult, Retriever};
use crate::rag::validator::{SemanticValidator, Validation};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Embedding,
    Retrieving,
    Prompting,
    Generating,
    Validating,
    Completed,
    Rejected,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Rejected | PipelineState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Received => "received",
            PipelineState::Embedding => "embedding",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Prompting => "prompting",
            PipelineState::Generating => "generating",
            PipelineState::Validating => "validating",
            PipelineState::Completed => "completed",
            PipelineState::Rejected => "rejected",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated answer and the passages it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunks that were actually placed in the prompt, in rank order.
    pub used_chunk_ids: Vec<u64>,
    pub average_similarity: f32,
    /// Whether the answer passed validation; `false` on a rejected draft.
    pub accepted: bool,
}

/// Terminal result of one pipeline run.
///
/// Every variant carries the trace of states the run went through, ending
/// with its own terminal state.
#[derive(Debug)]
pub enum QueryOutcome {
    Completed {
        answer: Answer,
        retrieval: RetrievalResult,
        trace: Vec<PipelineState>,
    },
    Rejected {
        draft: Answer,
        validation: Validation,
        retrieval: RetrievalResult,
        trace: Vec<PipelineState>,
    },
    Failed {
        /// State the run was in when the error occurred.
        state: PipelineState,
        error: QueryError,
        trace: Vec<PipelineState>,
    },
}

impl QueryOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            QueryOutcome::Completed { .. } => PipelineState::Completed,
            QueryOutcome::Rejected { .. } => PipelineState::Rejected,
            QueryOutcome::Failed { .. } => PipelineState::Failed,
        }
    }

    pub fn trace(&self) -> &[PipelineState] {
        match self {
            QueryOutcome::Completed { trace, .. }
            | QueryOutcome::Rejected { trace, .. }
            | QueryOutcome::Failed { trace, .. } => trace,
        }
    }

    /// Whether the run ever reached `state`.
    pub fn visited(&self, state: PipelineState) -> bool {
        self.trace().contains(&state)
    }
}

/// Per-run knobs, usually taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub max_context_length: usize,
    pub similarity_threshold: f32,
    pub max_answer_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_context_length: config.retrieval.max_context_length,
            similarity_threshold: config.validation.similarity_threshold,
            max_answer_chars: config.validation.max_answer_chars,
        }
    }
}

/// Answers questions against a [`Corpus`], gated by semantic validation.
///
/// The pipeline owns no corpus; callers pass a snapshot per run, so a swap
/// never affects a run that is already underway.
#[derive(Clone)]
pub struct QueryPipeline {
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    generator: Arc<dyn GenerationClient>,
    validator: SemanticValidator,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder.clone()),
            prompt_builder: PromptBuilder::new(),
            generator,
            validator: SemanticValidator::new(embedder, settings.max_answer_chars),
            settings,
        }
    }

    /// Builds a pipeline whose embedder and generator are both served by Ollama.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider = Arc::new(OllamaProvider::new(config)?);
        Ok(Self::new(
            provider.clone(),
            provider,
            PipelineSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs `question` through the pipeline against `corpus`.
    pub async fn run(&self, corpus: &Corpus, question: &str) -> QueryOutcome {
        let mut tracker = Tracker::new();

        match self.execute(corpus, question, &mut tracker).await {
            Ok((answer, validation, retrieval)) if validation.accepted => {
                tracker.advance(PipelineState::Completed);
                info!(
                    chunks = answer.used_chunk_ids.len(),
                    average_similarity = answer.average_similarity,
                    "question answered"
                );
                QueryOutcome::Completed {
                    answer,
                    retrieval,
                    trace: tracker.trace,
                }
            }
            Ok((draft, validation, retrieval)) => {
                tracker.advance(PipelineState::Rejected);
                warn!(
                    average_similarity = validation.average_similarity,
                    threshold = validation.threshold,
                    reason = %validation.reason,
                    "answer rejected"
                );
                QueryOutcome::Rejected {
                    draft,
                    validation,
                    retrieval,
                    trace: tracker.trace,
                }
            }
            Err(error) => {
                let state = tracker.current();
                tracker.advance(PipelineState::Failed);
                warn!(%state, kind = %error.kind(), %error, "question failed");
                QueryOutcome::Failed {
                    state,
                    error,
                    trace: tracker.trace,
                }
            }
        }
    }

    async fn execute(
        &self,
        corpus: &Corpus,
        question: &str,
        tracker: &mut Tracker,
    ) -> Result<(Answer, Validation, RetrievalResult), QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::Input("question is empty".to_string()));
        }

        tracker.advance(PipelineState::Embedding);
        let question_embedding = self.retriever.embed_question(question).await?;

        tracker.advance(PipelineState::Retrieving);
        let retrieval = self
            .retriever
            .search(corpus, &question_embedding, self.settings.top_k)?;

        tracker.advance(PipelineState::Prompting);
        let prompt = self.prompt_builder.build(
            question,
            retrieval.chunks(),
            self.settings.max_context_length,
        )?;
        if prompt.included < retrieval.len() {
            debug!(
                included = prompt.included,
                retrieved = retrieval.len(),
                "dropped passages to fit the prompt budget"
            );
        }

        tracker.advance(PipelineState::Generating);
        let text = self.generator.generate(&prompt.text).await?;

        tracker.advance(PipelineState::Validating);
        let evidence = &retrieval.hits[..prompt.included];
        let validation = self
            .validator
            .validate(&text, evidence, self.settings.similarity_threshold)
            .await?;

        let answer = Answer {
            text,
            used_chunk_ids: evidence.iter().map(|hit| hit.chunk.id).collect(),
            average_similarity: validation.average_similarity,
            accepted: validation.accepted,
        };
        Ok((answer, validation, retrieval))
    }
}

struct Tracker {
    trace: Vec<PipelineState>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            trace: vec![PipelineState::Received],
        }
    }

    fn current(&self) -> PipelineState {
        self.trace
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(from = %self.current(), to = %next, "pipeline transition");
        self.trace.push(next);
    }
}
