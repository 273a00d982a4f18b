use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole question-answering service.
///
/// Every section falls back to its defaults when omitted from the YAML file,
/// so a config only needs to name what it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Configuration for the generation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Kept at 0.0 so repeated prompts converge on the same answer.
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:latest".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            request_timeout_secs: 120,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Configuration for the embedding model shared by retrieval and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Defaults to `llm.base_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-minilm".to_string(),
            base_url: None,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest chunks handed to the prompt builder.
    pub top_k: usize,
    /// Budget for the rendered prompt, in characters.
    pub max_context_length: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_length: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum mean cosine similarity between answer and evidence.
    pub similarity_threshold: f32,
    /// Answers longer than this are rejected regardless of similarity.
    pub max_answer_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.15,
            max_answer_chars: 5000,
        }
    }
}

/// Configuration for turning a document folder into chunk records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,

    /// File extensions to ingest. Empty means every readable text file.
    pub extensions: Vec<String>,

    /// Skips directories/files whose name contains one of these strings.
    pub exclude_patterns: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    crate::patterns::default_exclude_patterns()
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            extensions: default_extensions(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Location of the persisted index artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./data/index"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/grounded.sock"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Embedding endpoint, falling back to the generation endpoint.
    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.llm.base_url)
    }

    /// Checks the values that the pipeline cannot operate without.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be greater than zero"));
        }
        if self.retrieval.max_context_length == 0 {
            return Err(invalid(
                "retrieval.max_context_length",
                "must be greater than zero",
            ));
        }
        let threshold = self.validation.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "validation.similarity_threshold",
                format!("{threshold} is outside [-1, 1]"),
            ));
        }
        if self.validation.max_answer_chars == 0 {
            return Err(invalid(
                "validation.max_answer_chars",
                "must be greater than zero",
            ));
        }
        if self.ingestion.chunk_size == 0 {
            return Err(invalid("ingestion.chunk_size", "must be greater than zero"));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
