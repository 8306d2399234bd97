//! Error taxonomy shared by every stage of the pipeline.
//!
//! Callers match on [`RagError`] to decide between retrying and failing
//! fast: [`RagError::is_retryable`] is true only for transient backend
//! conditions. Configuration and precondition errors are permanent.

use thiserror::Error;

/// Convenience alias used across the core crate.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RagError {
    /// Bad parameters or credentials (e.g. overlap >= chunk size, missing API key).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source document cannot be read or parsed.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The embedding or generation backend cannot be reached or answered badly.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The backend is throttling requests.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A backend call did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A query was issued before any index was built.
    #[error("index is empty: build the index before querying")]
    EmptyIndex,

    /// A vector's length differs from the index or embedder dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RagError {
    /// True for transient failures that a retry policy may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::ModelUnavailable(_) | RagError::RateLimited(_) | RagError::Timeout(_)
        )
    }

    /// Short, stable label used in trace events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Configuration(_) => "configuration",
            RagError::SourceUnavailable(_) => "source_unavailable",
            RagError::ModelUnavailable(_) => "model_unavailable",
            RagError::RateLimited(_) => "rate_limited",
            RagError::Timeout(_) => "timeout",
            RagError::EmptyIndex => "empty_index",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
        }
    }
}
