//! Retry and timeout decorators for model backends.
//!
//! Both wrap any backend and implement the same trait, so they stack
//! (`Retrying<WithTimeout<OpenAiChat>>`) without the wrapped backend or the
//! `AnswerGenerator` knowing about them.

use std::time::Duration;

use async_trait::async_trait;
use pdf_rag_core::embedding::EmbeddingBackend;
use pdf_rag_core::error::{RagError, Result};
use pdf_rag_core::generate::{ExponentialBackoff, GenerationBackend, GenerationOptions, RetryPolicy};
use pdf_rag_core::prompt::Prompt;

/// Re-issues failed calls while `policy` allows it.
pub struct Retrying<B, P = ExponentialBackoff> {
    inner: B,
    policy: P,
}

impl<B, P: RetryPolicy> Retrying<B, P> {
    pub fn new(inner: B, policy: P) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    match self.policy.next_delay(attempt, &err) {
                        Some(delay) => {
                            tracing::warn!(
                                backend = what,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "retrying after transient failure"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<B: GenerationBackend, P: RetryPolicy> GenerationBackend for Retrying<B, P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        self.run(self.inner.model_name(), || self.inner.generate(prompt, options))
            .await
    }
}

#[async_trait]
impl<B: EmbeddingBackend, P: RetryPolicy> EmbeddingBackend for Retrying<B, P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.run(self.inner.model_name(), || self.inner.embed(texts))
            .await
    }
}

/// Fails a call with [`RagError::Timeout`] once `limit` has elapsed.
pub struct WithTimeout<B> {
    inner: B,
    limit: Duration,
}

impl<B> WithTimeout<B> {
    pub fn new(inner: B, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<B: GenerationBackend> GenerationBackend for WithTimeout<B> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        tokio::time::timeout(self.limit, self.inner.generate(prompt, options))
            .await
            .map_err(|_| {
                RagError::Timeout(format!(
                    "{} did not answer within {:?}",
                    self.inner.model_name(),
                    self.limit
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_rag_core::generate::NoRetry;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the scripted errors, then answers "ok".
    struct Flaky {
        failures: Vec<RagError>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: Vec<RagError>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }
        async fn generate(&self, _prompt: &Prompt, _options: &GenerationOptions) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some(err) => Err(err.clone()),
                None => Ok("ok".to_string()),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl GenerationBackend for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _prompt: &Prompt, _options: &GenerationOptions) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn fast_backoff(max_retries: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            max_retries,
            base: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let backend = Retrying::new(
            Flaky::new(vec![
                RagError::RateLimited("429".into()),
                RagError::ModelUnavailable("503".into()),
            ]),
            fast_backoff(3),
        );
        let out = backend
            .generate(&Prompt::user("q"), &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let backend = Retrying::new(
            Flaky::new(vec![RagError::Timeout("t".into()); 5]),
            fast_backoff(2),
        );
        let err = backend
            .generate(&Prompt::user("q"), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)));
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let backend = Retrying::new(
            Flaky::new(vec![RagError::Configuration("bad key".into())]),
            fast_backoff(3),
        );
        assert!(backend
            .generate(&Prompt::user("q"), &GenerationOptions::default())
            .await
            .is_err());
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 1);

        let backend = Retrying::new(Flaky::new(vec![RagError::RateLimited("x".into())]), NoRetry);
        assert!(backend
            .generate(&Prompt::user("q"), &GenerationOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_timeout_error() {
        let backend = WithTimeout::new(Slow, Duration::from_millis(20));
        let err = backend
            .generate(&Prompt::user("q"), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)));
    }
}
