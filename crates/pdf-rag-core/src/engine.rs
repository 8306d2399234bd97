//! Retrieval-augmented answering engine.
//!
//! [`RagEngine`] runs the build phase once (through [`IndexBuild`]) and then
//! answers any number of questions against the frozen index:
//!
//! ```text
//! question → Retriever → format_context → PromptAssembler → AnswerGenerator → Answer
//! ```
//!
//! A new index replaces the old one only after its build completes, so a
//! failed rebuild leaves the previous index (or none) in place.

use std::sync::Arc;

use crate::chunk::ChunkConfig;
use crate::context::format_context;
use crate::embedding::EmbeddingBackend;
use crate::error::{RagError, Result};
use crate::generate::{AnswerGenerator, GenerationBackend, GenerationOptions};
use crate::index::VectorIndex;
use crate::models::{Answer, Document, RetrievalResult};
use crate::pipeline::{DocumentLoader, IndexBuild};
use crate::prompt::{Prompt, PromptAssembler};
use crate::retrieve::{Retriever, DEFAULT_K};
use crate::trace::{traced, Stage, TraceContext, Tracer};

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chunking: ChunkConfig,
    /// Chunks retrieved per question.
    pub k: usize,
    /// Texts per embedding request during the build.
    pub batch_size: usize,
    pub generation: GenerationOptions,
    pub trace: TraceContext,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            k: DEFAULT_K,
            batch_size: 64,
            generation: GenerationOptions::default(),
            trace: TraceContext::default(),
        }
    }
}

pub struct RagEngine {
    config: EngineConfig,
    embedder: Arc<dyn EmbeddingBackend>,
    generator: AnswerGenerator,
    assembler: PromptAssembler,
    tracer: Arc<dyn Tracer>,
    retriever: Option<Retriever>,
}

impl RagEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingBackend>,
        backend: Arc<dyn GenerationBackend>,
        tracer: Arc<dyn Tracer>,
    ) -> Result<Self> {
        if config.k == 0 {
            return Err(RagError::Configuration(
                "retrieval.k must be >= 1".to_string(),
            ));
        }
        if config.batch_size == 0 {
            return Err(RagError::Configuration(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        let generator = AnswerGenerator::new(
            backend,
            config.generation,
            tracer.clone(),
            config.trace.clone(),
        );
        Ok(Self {
            config,
            embedder,
            generator,
            assembler: PromptAssembler::default(),
            tracer,
            retriever: None,
        })
    }

    /// Replace the prompt assembler (e.g. to use a custom instruction).
    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_built(&self) -> bool {
        self.retriever.is_some()
    }

    pub fn index(&self) -> Option<&Arc<VectorIndex>> {
        self.retriever.as_ref().map(|r| r.index())
    }

    /// Load `source` with `loader` and build a fresh index from it.
    ///
    /// Returns the number of indexed chunks.
    pub async fn build(&mut self, loader: &dyn DocumentLoader, source: &str) -> Result<usize> {
        let loaded = self.start_build().load(loader, source)?;
        self.finish_build(loaded).await
    }

    /// Build a fresh index from an already loaded document.
    pub async fn build_from_document(&mut self, document: Document) -> Result<usize> {
        let loaded = self.start_build().with_document(document);
        self.finish_build(loaded).await
    }

    fn start_build(&self) -> IndexBuild<crate::pipeline::Empty> {
        IndexBuild::new(self.tracer.clone(), self.config.trace.clone())
    }

    async fn finish_build(&mut self, loaded: IndexBuild<crate::pipeline::Loaded>) -> Result<usize> {
        let index = loaded
            .chunk(&self.config.chunking)?
            .embed(self.embedder.as_ref(), self.config.batch_size)
            .await?
            .finish();
        let count = index.len();
        let retriever = Retriever::new(
            self.embedder.clone(),
            index,
            self.config.k,
            self.tracer.clone(),
            self.config.trace.clone(),
        )?;
        self.retriever = Some(retriever);
        tracing::debug!(chunks = count, "index built");
        Ok(count)
    }

    fn retriever(&self) -> Result<&Retriever> {
        self.retriever.as_ref().ok_or(RagError::EmptyIndex)
    }

    /// Top-k chunks for `question`, without generation.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        let question = validate_question(question)?;
        self.retriever()?.retrieve(question).await
    }

    /// Retrieve, format, and assemble the prompt for `question`.
    pub async fn prepare(&self, question: &str) -> Result<(RetrievalResult, Prompt)> {
        let question = validate_question(question)?;
        let sources = self.retriever()?.retrieve(question).await?;
        let ctx = &self.config.trace;
        let context = traced(
            self.tracer.as_ref(),
            ctx,
            Stage::FormatContext,
            |c: &String| c.len(),
            || Ok(format_context(&sources)),
        )?;
        let prompt = traced(
            self.tracer.as_ref(),
            ctx,
            Stage::AssemblePrompt,
            |p: &Prompt| p.len(),
            || Ok(self.assembler.assemble(question, &context)),
        )?;
        Ok((sources, prompt))
    }

    /// Answer `question` from the indexed document.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let (sources, prompt) = self.prepare(question).await?;
        let text = self.generator.generate(&prompt).await?;
        Ok(Answer {
            question: question.trim().to_string(),
            text,
            sources,
        })
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::Configuration(
            "question must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
