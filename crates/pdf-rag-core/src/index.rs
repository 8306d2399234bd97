//! In-memory vector index with brute-force cosine search.
//!
//! Entries are kept in insertion order. Queries score every entry and use a
//! stable sort, so equal scores keep their insertion order. Once built the
//! index is shared as `Arc<VectorIndex>`: it holds no interior mutability,
//! so concurrent readers need no locking.

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

/// A chunk and its embedding, owned by the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// Stores `(chunk, embedding)` pairs of a single, fixed dimension.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Insert one entry. The embedding must match the index dimension.
    pub fn insert(&mut self, chunk: Chunk, embedding: Vec<f32>) -> Result<()> {
        self.check_dims(embedding.len())?;
        self.entries.push(IndexEntry { chunk, embedding });
        Ok(())
    }

    /// Insert chunks with their embeddings, pairwise.
    ///
    /// Validates every vector before inserting any, so a failed batch
    /// leaves the index unchanged.
    pub fn insert_batch(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::ModelUnavailable(format!(
                "got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        for e in &embeddings {
            self.check_dims(e.len())?;
        }
        self.entries.reserve(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            self.entries.push(IndexEntry { chunk, embedding });
        }
        Ok(())
    }

    /// Return at most `k` entries ranked by cosine similarity to `vector`.
    ///
    /// An empty index yields an empty result. `k = 0` yields an empty result.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dims(vector.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    fn check_dims(&self, actual: usize) -> Result<()> {
        if actual != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual,
            });
        }
        Ok(())
    }
}
