//! Generation backend trait, retry policies, and the answer generator.
//!
//! [`GenerationBackend`] is the seam for language-model providers. Retries
//! are not built in: a caller layers them on by wrapping any backend in a
//! decorator that consults a [`RetryPolicy`] (the app crate's `Retrying`),
//! without touching [`AnswerGenerator`] or the backend itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::prompt::Prompt;
use crate::trace::{traced_async, Stage, TraceContext, Tracer};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for language-model backends.
///
/// Implementations must keep [`RagError::ModelUnavailable`],
/// [`RagError::RateLimited`] and [`RagError::Timeout`] distinct so callers
/// can choose between retrying and failing fast.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String>;
}

#[async_trait]
impl<T: GenerationBackend + ?Sized> GenerationBackend for Arc<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        (**self).generate(prompt, options).await
    }
}

/// Decides whether and when to retry a failed call.
pub trait RetryPolicy: Send + Sync {
    /// Delay before retry number `attempt` (1-based) after `err`, or `None` to give up.
    fn next_delay(&self, attempt: u32, err: &RagError) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _err: &RagError) -> Option<Duration> {
        None
    }
}

/// Exponential backoff for retryable errors: `base`, `2×base`, `4×base`, …
/// capped at `max_delay`, for at most `max_retries` retries.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub max_retries: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, err: &RagError) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries || !err.is_retryable() {
            return None;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }
}

/// Sends assembled prompts to a backend and returns the generated text.
#[derive(Clone)]
pub struct AnswerGenerator {
    backend: Arc<dyn GenerationBackend>,
    options: GenerationOptions,
    tracer: Arc<dyn Tracer>,
    trace_ctx: TraceContext,
}

impl AnswerGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        options: GenerationOptions,
        tracer: Arc<dyn Tracer>,
        trace_ctx: TraceContext,
    ) -> Self {
        Self {
            backend,
            options,
            tracer,
            trace_ctx,
        }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace_ctx
    }

    /// Generate with the configured options.
    pub async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.generate_with(prompt, &self.options).await
    }

    /// Generate with explicit options (e.g. a per-step temperature).
    ///
    /// A blank completion is reported as [`RagError::ModelUnavailable`]
    /// rather than returned as an answer.
    pub async fn generate_with(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<String> {
        traced_async(
            self.tracer.as_ref(),
            &self.trace_ctx,
            Stage::Generate,
            |text: &String| text.len(),
            async {
                let text = self.backend.generate(prompt, options).await?;
                if text.trim().is_empty() {
                    return Err(RagError::ModelUnavailable(format!(
                        "{} returned an empty completion",
                        self.backend.model_name()
                    )));
                }
                Ok(text)
            },
        )
        .await
    }
}
