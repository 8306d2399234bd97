//! Embedding backend trait and vector utilities.
//!
//! Defines the [`EmbeddingBackend`] trait that every embedding provider
//! implements, the offline [`HashEmbedder`], and pure helpers for similarity
//! computation and response validation.
//!
//! Network providers (OpenAI-compatible, Ollama, fastembed) live in the
//! `pdf-rag` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Trait for embedding backends.
///
/// Implementations must be deterministic for a fixed model configuration
/// and must report unreachable backends as [`RagError::ModelUnavailable`]
/// rather than returning placeholder vectors.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(backend: &dyn EmbeddingBackend, text: &str) -> Result<Vec<f32>> {
    let vectors = backend.embed(&[text.to_string()]).await?;
    let vectors = validate_embeddings(backend.dims(), 1, vectors)?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| RagError::ModelUnavailable("empty embedding response".to_string()))
}

/// Check that a backend answered with `expected_count` vectors of `dims` length.
pub fn validate_embeddings(
    dims: usize,
    expected_count: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected_count {
        return Err(RagError::ModelUnavailable(format!(
            "backend returned {} embeddings for {} inputs",
            vectors.len(),
            expected_count
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(RagError::ModelUnavailable(
            "backend returned a non-finite embedding value".to_string(),
        ));
    }
    Ok(vectors)
}

// ============ Hash Embedder ============

/// Deterministic, dependency-free embedder based on feature hashing.
///
/// Each lowercased alphanumeric token is hashed into one of `dims` buckets
/// with a hash-derived sign, and the resulting vector is L2-normalized.
/// Texts sharing words therefore have positive cosine similarity. Useful
/// offline and in tests; it carries no semantic knowledge beyond word overlap.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMS: usize = 384;

    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::Configuration(
                "embedding.dims must be > 0".to_string(),
            ));
        }
        Ok(Self { dims })
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dims: Self::DEFAULT_DIMS,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Lowercased alphanumeric tokens, with a few very common English words dropped.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    const STOPWORDS: [&str; 12] = [
        "a", "an", "the", "is", "of", "and", "or", "to", "in", "what", "which", "who",
    ];
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

// ============ Vector utilities ============

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_hash_embedder_deterministic_and_normalized() {
        let e = HashEmbedder::new(64).unwrap();
        let a = e.embed_one("Paris is the capital of France");
        let b = e.embed_one("Paris is the capital of France");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_word_overlap_ranks_higher() {
        let e = HashEmbedder::default();
        let q = e.embed_one("What is the capital of France?");
        let related = e.embed_one("Paris is the capital of France.");
        let unrelated = e.embed_one("Photosynthesis converts sunlight into chemical energy.");
        assert!(cosine_similarity(&q, &related) > cosine_similarity(&q, &unrelated));
    }

    #[test]
    fn test_hash_embedder_rejects_zero_dims() {
        assert!(matches!(
            HashEmbedder::new(0),
            Err(RagError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_embeddings() {
        assert!(validate_embeddings(2, 1, vec![vec![1.0, 0.0]]).is_ok());
        assert!(matches!(
            validate_embeddings(2, 2, vec![vec![1.0, 0.0]]),
            Err(RagError::ModelUnavailable(_))
        ));
        assert!(matches!(
            validate_embeddings(3, 1, vec![vec![1.0, 0.0]]),
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_validate_embeddings_rejects_non_finite_values() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                validate_embeddings(2, 2, vec![vec![1.0, 0.0], vec![bad, 1.0]]),
                Err(RagError::ModelUnavailable(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_embed_query_single_vector() {
        let e = HashEmbedder::new(16).unwrap();
        let v = embed_query(&e, "hello world").await.unwrap();
        assert_eq!(v, e.embed_one("hello world"));
    }
}
