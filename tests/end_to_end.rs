//! Index a folder, load it back, and answer through the facade crate.

use grounded::prelude::*;
use grounded::rag::embedder;
use std::sync::Arc;

/// Bag-of-letters embedding: counts of 'a'..'z', so related texts point the
/// same way and the output is deterministic.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn encode(&self, texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 26];
                for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "letters"
    }
}

/// Answers with a fixed string.
struct CannedGenerator(&'static str);

#[async_trait]
impl GenerationClient for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.0.to_string())
    }
}

fn write_docs(dir: &std::path::Path) {
    std::fs::write(
        dir.join("france.txt"),
        "Paris is the capital of France.\n\nThe Seine runs through Paris.",
    )
    .unwrap();
    std::fs::write(dir.join("zoo.txt"), "Zebras quietly yawn at xylophones.").unwrap();
}

fn config(index_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.ingestion.chunk_size = 40;
    config.storage.index_dir = index_dir.to_path_buf();
    config.embedding.model = "letters".to_string();
    config
}

#[tokio::test]
async fn indexed_folder_answers_grounded_questions() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("grounded_core=debug"))
        .with_test_writer()
        .try_init();

    let docs = tempfile::tempdir()?;
    let store = tempfile::tempdir()?;
    write_docs(docs.path());
    let config = config(&store.path().join("index"));

    let stats = grounded::rag::index_directory(&LetterEmbedder, docs.path(), &config).await?;
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 3);

    let corpus = Corpus::load(&config.storage.index_dir)?;
    corpus.ensure_model(LetterEmbedder.model_id())?;

    let pipeline = QueryPipeline::new(
        Arc::new(LetterEmbedder),
        Arc::new(CannedGenerator("Paris is the capital of France.")),
        PipelineSettings {
            top_k: 1,
            ..PipelineSettings::from(&config)
        },
    );

    match pipeline.run(&corpus, "What is the capital of France?").await {
        QueryOutcome::Completed { answer, retrieval, .. } => {
            assert_eq!(retrieval.hits[0].chunk.document_name, "france.txt");
            assert_eq!(answer.used_chunk_ids, vec![0]);
            assert!(answer.average_similarity > 0.99);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let response = Response::from(pipeline.run(&corpus, "   ").await);
    let value = serde_json::to_value(&response)?;
    assert_eq!(value["code"], 400);

    Ok(())
}

#[tokio::test]
async fn unrelated_answer_is_rejected() -> anyhow::Result<()> {
    let docs = tempfile::tempdir()?;
    let store = tempfile::tempdir()?;
    write_docs(docs.path());
    let config = config(&store.path().join("index"));
    grounded::rag::index_directory(&LetterEmbedder, docs.path(), &config).await?;
    let corpus = Corpus::load(&config.storage.index_dir)?;

    let pipeline = QueryPipeline::new(
        Arc::new(LetterEmbedder),
        Arc::new(CannedGenerator("zzz")),
        PipelineSettings {
            top_k: 1,
            similarity_threshold: 0.5,
            ..PipelineSettings::from(&config)
        },
    );

    let outcome = pipeline.run(&corpus, "What is the capital of France?").await;
    assert_eq!(outcome.state(), PipelineState::Rejected);

    let value = serde_json::to_value(Response::from(outcome))?;
    assert_eq!(value["status"], "gateway_error");
    assert_eq!(value["kind"], "validation_rejection");

    Ok(())
}
