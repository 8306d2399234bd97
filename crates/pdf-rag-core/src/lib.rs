//! # pdf-rag core
//!
//! Backend-agnostic retrieval-augmented answering: data models, chunking,
//! the embedding and generation traits, an in-memory vector index, context
//! formatting, prompt assembly, prompt chains, and stage tracing.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Concrete
//! loaders and model backends live in the `pdf-rag` application crate and
//! plug in through [`pipeline::DocumentLoader`],
//! [`embedding::EmbeddingBackend`] and [`generate::GenerationBackend`].

pub mod chain;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod trace;

pub use engine::{EngineConfig, RagEngine};
pub use error::{RagError, Result};
