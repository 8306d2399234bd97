//! Language-model backends.
//!
//! - **[`OpenAiChat`]**: OpenAI-compatible `POST {base_url}/chat/completions`.
//!   Defaults to Groq's endpoint and `llama-3.1-8b-instant`.
//! - **[`OllamaChat`]**: a local Ollama instance's `POST /api/chat`.
//! - **[`DisabledGenerator`]**: fails every call; lets `rag retrieve` and
//!   tests run without a model.
//!
//! [`create_backend`] stacks the chosen backend inside [`WithTimeout`] and
//! [`Retrying`] as configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pdf_rag_core::error::{RagError, Result};
use pdf_rag_core::generate::{ExponentialBackoff, GenerationBackend, GenerationOptions};
use pdf_rag_core::prompt::Prompt;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::http;
use crate::retry::{Retrying, WithTimeout};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiChat {
    /// The API key is read from the environment variable named by
    /// `generation.api_key_env` (`CHAT_GROQ_KEY` by default).
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = http::api_key(&config.api_key_env)?;
        let base_url = config.base_url.as_deref().unwrap_or(GROQ_BASE_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/chat/completions", self.base_url),
            Some(&self.api_key),
            &body,
            "chat completions",
        )
        .await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::ModelUnavailable(
                "invalid chat completion: missing choices[0].message.content".to_string(),
            )
        })
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": prompt.messages,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/chat", self.base_url),
            None,
            &body,
            "Ollama",
        )
        .await?;
        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::ModelUnavailable(
                    "invalid Ollama response: missing message.content".to_string(),
                )
            })
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerationBackend for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &Prompt, _options: &GenerationOptions) -> Result<String> {
        Err(RagError::Configuration(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ Selection ============

fn layered<B: GenerationBackend + 'static>(
    backend: B,
    config: &GenerationConfig,
) -> Arc<dyn GenerationBackend> {
    let policy = ExponentialBackoff {
        max_retries: config.max_retries,
        ..ExponentialBackoff::default()
    };
    Arc::new(Retrying::new(
        WithTimeout::new(backend, Duration::from_secs(config.timeout_secs)),
        policy,
    ))
}

/// Create the [`GenerationBackend`] named by `config.provider`
/// (`openai`, `ollama` or `disabled`).
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(layered(OpenAiChat::new(config)?, config)),
        "ollama" => Ok(layered(OllamaChat::new(config)?, config)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => Err(RagError::Configuration(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}
