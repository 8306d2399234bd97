//! Typed build pipeline: `Empty → Loaded → Chunked → Indexed`.
//!
//! Each transition consumes the previous state, so stages can only run in
//! order and never backwards. A failed transition drops everything built so
//! far; only a completed [`IndexBuild<Indexed>`] yields a queryable index.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use pdf_rag_core::chunk::ChunkConfig;
//! # use pdf_rag_core::embedding::HashEmbedder;
//! # use pdf_rag_core::models::Document;
//! # use pdf_rag_core::pipeline::IndexBuild;
//! # use pdf_rag_core::trace::{noop, TraceContext};
//! # async fn demo() -> pdf_rag_core::error::Result<()> {
//! let doc = Document::from_page_texts("notes.txt", ["Paris is the capital of France."]);
//! let index = IndexBuild::new(noop(), TraceContext::default())
//!     .with_document(doc)
//!     .chunk(&ChunkConfig::default())?
//!     .embed(&HashEmbedder::default(), 64)
//!     .await?
//!     .finish();
//! assert_eq!(index.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::chunk::{ChunkConfig, Chunker};
use crate::embedding::{validate_embeddings, EmbeddingBackend};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, Document};
use crate::trace::{traced, traced_async, Stage, TraceContext, Tracer};

/// Reads a source (path or URI) into page-level text.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<Document>;
}

/// Nothing loaded yet.
pub struct Empty;

/// A document has been loaded.
pub struct Loaded {
    document: Document,
}

/// The document has been split into chunks.
pub struct Chunked {
    chunks: Vec<Chunk>,
}

/// Every chunk has been embedded and inserted.
pub struct Indexed {
    index: VectorIndex,
}

/// One run of the build phase, in state `S`.
pub struct IndexBuild<S> {
    state: S,
    tracer: Arc<dyn Tracer>,
    trace_ctx: TraceContext,
}

impl<S> IndexBuild<S> {
    fn advance<T>(self, state: T) -> IndexBuild<T> {
        IndexBuild {
            state,
            tracer: self.tracer,
            trace_ctx: self.trace_ctx,
        }
    }
}

impl IndexBuild<Empty> {
    pub fn new(tracer: Arc<dyn Tracer>, trace_ctx: TraceContext) -> Self {
        Self {
            state: Empty,
            tracer,
            trace_ctx,
        }
    }

    /// Load `source` with `loader`.
    pub fn load(self, loader: &dyn DocumentLoader, source: &str) -> Result<IndexBuild<Loaded>> {
        let document = traced(
            self.tracer.as_ref(),
            &self.trace_ctx,
            Stage::Load,
            |d: &Document| d.pages.len(),
            || loader.load(source),
        )?;
        Ok(self.with_document(document))
    }

    /// Start from an already loaded document.
    pub fn with_document(self, document: Document) -> IndexBuild<Loaded> {
        self.advance(Loaded { document })
    }
}

impl IndexBuild<Loaded> {
    pub fn document(&self) -> &Document {
        &self.state.document
    }

    /// Split every page. A document without any text is rejected.
    pub fn chunk(self, config: &ChunkConfig) -> Result<IndexBuild<Chunked>> {
        let document = &self.state.document;
        let chunks = traced(
            self.tracer.as_ref(),
            &self.trace_ctx,
            Stage::Split,
            |c: &Vec<Chunk>| c.len(),
            || {
                if document.pages.iter().all(|p| p.text.trim().is_empty()) {
                    return Err(RagError::SourceUnavailable(format!(
                        "{} contains no extractable text",
                        document.source
                    )));
                }
                Ok(Chunker::new(*config).split_document(document))
            },
        )?;
        Ok(self.advance(Chunked { chunks }))
    }
}

impl IndexBuild<Chunked> {
    pub fn chunks(&self) -> &[Chunk] {
        &self.state.chunks
    }

    /// Embed chunks in batches of `batch_size` and insert them into a new index.
    pub async fn embed(
        self,
        embedder: &dyn EmbeddingBackend,
        batch_size: usize,
    ) -> Result<IndexBuild<Indexed>> {
        if batch_size == 0 {
            return Err(RagError::Configuration(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        let chunks = &self.state.chunks;

        let vectors = traced_async(
            self.tracer.as_ref(),
            &self.trace_ctx,
            Stage::Embed,
            |v: &Vec<Vec<f32>>| v.len(),
            async {
                let mut vectors = Vec::with_capacity(chunks.len());
                for batch in chunks.chunks(batch_size) {
                    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                    let embedded = embedder.embed(&texts).await?;
                    vectors.extend(validate_embeddings(embedder.dims(), batch.len(), embedded)?);
                }
                Ok(vectors)
            },
        )
        .await?;

        let tracer = self.tracer.clone();
        let trace_ctx = self.trace_ctx.clone();
        let chunks = self.state.chunks;
        let dims = embedder.dims();
        let index = traced(
            tracer.as_ref(),
            &trace_ctx,
            Stage::Index,
            |i: &VectorIndex| i.len(),
            move || {
                let mut index = VectorIndex::new(dims);
                index.insert_batch(chunks, vectors)?;
                Ok(index)
            },
        )?;

        Ok(IndexBuild {
            state: Indexed { index },
            tracer,
            trace_ctx,
        })
    }
}

impl IndexBuild<Indexed> {
    pub fn index(&self) -> &VectorIndex {
        &self.state.index
    }

    /// Freeze the index for shared, read-only querying.
    pub fn finish(self) -> Arc<VectorIndex> {
        Arc::new(self.state.index)
    }
}
