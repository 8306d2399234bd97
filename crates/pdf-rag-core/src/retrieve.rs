//! Query-time retrieval policy: embed the question, take the top `k`.

use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingBackend};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;
use crate::trace::{traced_async, Stage, TraceContext, Tracer};

/// Default number of chunks retrieved per query.
pub const DEFAULT_K: usize = 4;

/// Wraps a built [`VectorIndex`] with a fixed top-`k` similarity policy.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<VectorIndex>,
    k: usize,
    tracer: Arc<dyn Tracer>,
    trace_ctx: TraceContext,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<VectorIndex>,
        k: usize,
        tracer: Arc<dyn Tracer>,
        trace_ctx: TraceContext,
    ) -> Result<Self> {
        if k == 0 {
            return Err(RagError::Configuration(
                "retrieval.k must be >= 1".to_string(),
            ));
        }
        if embedder.dims() != index.dims() {
            return Err(RagError::DimensionMismatch {
                expected: index.dims(),
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            embedder,
            index,
            k,
            tracer,
            trace_ctx,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed `query` and return up to `k` chunks, most similar first.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        traced_async(
            self.tracer.as_ref(),
            &self.trace_ctx,
            Stage::Retrieve,
            |r: &RetrievalResult| r.len(),
            async {
                let vector = embed_query(self.embedder.as_ref(), query).await?;
                self.index.query(&vector, self.k)
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_document, ChunkConfig};
    use crate::embedding::HashEmbedder;
    use crate::models::Document;
    use crate::trace::{noop, MemoryTracer};

    fn build(texts: &[&str], embedder: &HashEmbedder) -> Arc<VectorIndex> {
        let doc = Document::from_page_texts("doc", texts.iter().copied());
        let chunks = chunk_document(&doc, &ChunkConfig::default());
        let vectors = chunks.iter().map(|c| embedder.embed_one(&c.text)).collect();
        let mut index = VectorIndex::new(embedder.dims());
        index.insert_batch(chunks, vectors).unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_retrieves_most_relevant_first() {
        let embedder = HashEmbedder::default();
        let index = build(
            &[
                "Rust has a borrow checker.",
                "Paris is the capital of France.",
                "Bananas are yellow.",
            ],
            &embedder,
        );
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            2,
            noop(),
            TraceContext::default(),
        )
        .unwrap();
        let result = retriever.retrieve("capital of France").await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].chunk.page_number, 2);
    }

    #[test]
    fn test_zero_k_rejected() {
        let embedder = HashEmbedder::new(8).unwrap();
        let index = Arc::new(VectorIndex::new(8));
        let err = Retriever::new(Arc::new(embedder), index, 0, noop(), TraceContext::default());
        assert!(matches!(err, Err(RagError::Configuration(_))));
    }

    #[test]
    fn test_embedder_index_dims_must_agree() {
        let embedder = HashEmbedder::new(8).unwrap();
        let index = Arc::new(VectorIndex::new(16));
        let err = Retriever::new(Arc::new(embedder), index, 4, noop(), TraceContext::default());
        assert!(matches!(err, Err(RagError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_retrieve_is_traced() {
        let embedder = HashEmbedder::default();
        let index = build(&["one page only"], &embedder);
        let tracer = Arc::new(MemoryTracer::new());
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            4,
            tracer.clone(),
            TraceContext::named("q"),
        )
        .unwrap();
        retriever.retrieve("page").await.unwrap();
        assert_eq!(tracer.completed_stages(), vec![Stage::Retrieve]);
    }
}
