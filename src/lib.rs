//! # pdf-rag
//!
//! Ask questions about a PDF and get answers grounded in its text.
//!
//! This crate is the native side of the project: configuration, document
//! loading, HTTP model backends, retry and timeout decorators, and the `rag`
//! command-line tool. The pipeline itself (chunking, vector index,
//! retrieval, prompt assembly, chains, tracing) lives in `pdf-rag-core`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│ VectorIndex │   build, once
//! │ PDF/text │   └─────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                       │
//!                                                    ▼
//!   question ──▶ Retriever ──▶ Context ──▶ Prompt ──▶ Generator ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export CHAT_GROQ_KEY=...          # or put it in .env
//! rag pdf report.pdf --question "What is the main finding?"
//! rag retrieve report.pdf "methodology" --k 3
//! rag ask "what is the capital of india?"
//! rag chain "Unemployment in India"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`loader`] | PDF and text document loaders |
//! | [`embedding`] | Embedding backends and selection |
//! | [`generation`] | Language-model backends and selection |
//! | [`retry`] | `Retrying` and `WithTimeout` decorators |
//! | [`http`] | Shared HTTP client and status mapping |
//! | [`commands`] | `rag` subcommand implementations |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod http;
pub mod loader;
pub mod retry;

pub use pdf_rag_core as core;
