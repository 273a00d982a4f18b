//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements both
//! collaborator contracts: [`EmbeddingProvider`] through `/api/embed` and
//! [`GenerationClient`] through `/api/chat`.

use super::types::*;
use crate::config::Config;
use crate::rag::embedder::{self, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    embedding_url: String,
    http_client: reqwest::Client,
    model: String,
    embedding_model: String,
    temperature: f64,
    max_tokens: u32,
    system_prompt: String,
}

impl OllamaProvider {
    /// Creates a new Ollama provider with the specified config.
    ///
    /// The HTTP client carries `llm.request_timeout_secs`; exceeding it
    /// surfaces as [`GenerationError::Timeout`].
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            embedding_url: config.embedding_base_url().trim_end_matches('/').to_string(),
            http_client,
            model: config.llm.model.clone(),
            embedding_model: config.embedding.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            system_prompt: config.llm.system_prompt.clone(),
        })
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        // Convert to Ollama-specific request format
        let ollama_request = OllamaChatRequest {
            model: request.model,
            messages: request.messages,
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                opts.insert("num_predict".to_string(), serde_json::json!(request.max_tokens));
                opts
            },
            stream: false,
        };

        let response = self.http_client.post(&url).json(&ollama_request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let chat_response = response.json::<OllamaChatResponse>().await?;
        debug!(
            model = %chat_response.model,
            done = chat_response.done,
            done_reason = ?chat_response.done_reason,
            "chat completion received"
        );

        let content = chat_response.message.content.trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::Other("empty completion".to_string()));
        }
        Ok(content)
    }
}

#[async_trait]
impl GenerationClient for OllamaProvider {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let messages = vec![Message::system(&self.system_prompt), Message::user(prompt)];
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        Ok(self.chat(request).await?)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn encode(&self, texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.embedding_url);
        let embed_request = EmbedRequest {
            model: self.embedding_model.clone(),
            input: texts.iter().map(|t| t.to_string()).collect(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&embed_request)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.map_err(ProviderError::from)?;
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_text,
            }
            .into());
        }

        let embed_response = response
            .json::<EmbedResponse>()
            .await
            .map_err(ProviderError::from)?;

        embedder::ensure_count(texts.len(), &embed_response.embeddings)?;
        Ok(embed_response.embeddings)
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    options: HashMap<String, serde_json::Value>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: Message,
    #[serde(default)]
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    done_reason: Option<String>,
}
