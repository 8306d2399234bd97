//! Embedding backends and backend selection.
//!
//! Concrete implementations of [`EmbeddingBackend`]:
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are turned off.
//! - **`HashEmbedder`** (from the core crate): deterministic and offline; the
//!   default when built without `local-embeddings-fastembed`.
//! - **[`OpenAiEmbedder`]**: any OpenAI-compatible `POST /embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: in-process inference via fastembed
//!   (feature `local-embeddings-fastembed`, on by default); no network calls
//!   after the model download. The default provider in that build.
//!
//! # Provider Selection
//!
//! Use [`create_backend`] to instantiate the backend named by the
//! configuration:
//!
//! ```rust
//! # use pdf_rag::config::EmbeddingConfig;
//! # use pdf_rag::embedding::create_backend;
//! let config = EmbeddingConfig {
//!     provider: "hash".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let backend = create_backend(&config).unwrap();
//! assert_eq!(backend.model_name(), "hash");
//! assert_eq!(backend.dims(), 384);
//! ```
//!
//! # Retry Strategy
//!
//! Remote backends are wrapped in [`Retrying`] with exponential backoff
//! (1s, 2s, 4s, … capped at 32s, `embedding.max_retries` attempts). Only
//! rate limits, timeouts and unavailable-model errors are retried.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use pdf_rag_core::embedding::{EmbeddingBackend, HashEmbedder};
use pdf_rag_core::error::{RagError, Result};
use pdf_rag_core::generate::ExponentialBackoff;
use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::http;
use crate::retry::Retrying;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// Fails every request with a configuration error.
pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingBackend for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Configuration(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI-compatible ============

/// Embedding backend for OpenAI-compatible `POST {url}/embeddings` APIs.
///
/// The API key is read once, at construction, from the environment variable
/// named by `embedding.api_key_env`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::Configuration("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            RagError::Configuration("embedding.dims required for OpenAI provider".to_string())
        })?;
        let api_key = http::api_key(&config.api_key_env)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/embeddings", self.url),
            Some(&self.api_key),
            &body,
            "OpenAI embeddings",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        RagError::ModelUnavailable("invalid OpenAI response: missing data array".to_string())
    })?;

    let mut items = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item.get("embedding").ok_or_else(|| {
            RagError::ModelUnavailable("invalid OpenAI response: missing embedding".to_string())
        })?;
        items.push((index, http::parse_vector(embedding, "OpenAI")?));
    }
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding backend for a local Ollama instance.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::Configuration("embedding.model required for Ollama provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            RagError::Configuration("embedding.dims required for Ollama provider".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::ModelUnavailable(
                "invalid Ollama response: missing embeddings array".to_string(),
            )
        })?;
    embeddings
        .iter()
        .map(|e| http::parse_vector(e, "Ollama"))
        .collect()
}

// ============ Selection ============

fn backoff(max_retries: u32) -> ExponentialBackoff {
    ExponentialBackoff {
        max_retries,
        ..ExponentialBackoff::default()
    }
}

/// Create the [`EmbeddingBackend`] named by `config.provider`.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"hash"` | `HashEmbedder` |
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] behind [`Retrying`] |
/// | `"ollama"` | [`OllamaEmbedder`] behind [`Retrying`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(
            config.dims.unwrap_or(HashEmbedder::DEFAULT_DIMS),
        )?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(Retrying::new(
            OpenAiEmbedder::new(config)?,
            backoff(config.max_retries),
        ))),
        "ollama" => Ok(Arc::new(Retrying::new(
            OllamaEmbedder::new(config)?,
            backoff(config.max_retries),
        ))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RagError::Configuration(
            "local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(RagError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_response_reordered_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_response_missing_data() {
        let err = parse_openai_response(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, RagError::ModelUnavailable(_)));
    }

    #[test]
    fn test_ollama_response() {
        let vectors = parse_ollama_response(&json!({"embeddings": [[0.25, 0.5]]})).unwrap();
        assert_eq!(vectors, vec![vec![0.25, 0.5]]);
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[test]
    fn test_hash_dims_follow_config() {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(64),
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_backend(&config).unwrap().dims(), 64);
    }

    #[tokio::test]
    async fn test_disabled_backend_refuses() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..EmbeddingConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        let err = backend.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_openai_without_key_is_configuration_error() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(1536),
            api_key_env: "PDF_RAG_TEST_EMBED_KEY_NEVER_SET".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_backend(&config).err(),
            Some(RagError::Configuration(_))
        ));
    }
}
