//! Implementations of the `rag` subcommands.
//!
//! Each `run_*` function takes the loaded [`Config`], wires the configured
//! backends into the core engine, and prints its result to stdout.
//! Diagnostics go to stderr through `tracing`.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use pdf_rag_core::chain::{report_then_summary, single_prompt};
use pdf_rag_core::generate::{AnswerGenerator, GenerationBackend};
use pdf_rag_core::models::RetrievalResult;
use pdf_rag_core::prompt::PromptAssembler;
use pdf_rag_core::trace::{noop, LogTracer, Tracer};
use pdf_rag_core::RagEngine;

use crate::config::{Config, TraceConfig};
use crate::loader::FileLoader;
use crate::{embedding, generation};

const EXCERPT_CHARS: usize = 240;

/// Temperature of the summary step of `rag chain`.
pub const SUMMARY_TEMPERATURE: f32 = 0.6;

pub fn tracer_for(trace: &TraceConfig) -> Arc<dyn Tracer> {
    if trace.enabled {
        Arc::new(LogTracer)
    } else {
        noop()
    }
}

/// Build an engine from `config` with the given generation backend.
pub fn engine_with(config: &Config, backend: Arc<dyn GenerationBackend>) -> Result<RagEngine> {
    let embedder = embedding::create_backend(&config.embedding)
        .context("Failed to create embedding backend")?;
    let mut engine = RagEngine::new(
        config.engine_config()?,
        embedder,
        backend,
        tracer_for(&config.trace),
    )?;
    if let Some(instruction) = &config.generation.system_prompt {
        engine = engine.with_assembler(PromptAssembler::new(instruction.clone()));
    }
    Ok(engine)
}

fn generation_backend(config: &Config) -> Result<Arc<dyn GenerationBackend>> {
    generation::create_backend(&config.generation).context("Failed to create generation backend")
}

async fn build_index(engine: &mut RagEngine, path: &str) -> Result<()> {
    let chunks = engine
        .build(&FileLoader, path)
        .await
        .with_context(|| format!("Failed to build index from {}", path))?;
    tracing::info!(path, chunks, "index ready");
    Ok(())
}

fn read_question_from_stdin() -> Result<String> {
    let mut question = String::new();
    std::io::stdin()
        .read_to_string(&mut question)
        .context("Failed to read question from stdin")?;
    Ok(question)
}

/// `rag pdf <path> [--question Q]`: build, then answer one question.
pub async fn run_pdf(config: &Config, path: &str, question: Option<String>) -> Result<()> {
    let mut engine = engine_with(config, generation_backend(config)?)?;
    build_index(&mut engine, path).await?;

    let question = match question {
        Some(q) => q,
        None => read_question_from_stdin()?,
    };
    let answer = engine.answer(&question).await?;

    println!("{}", answer.text.trim());
    Ok(())
}

/// `rag retrieve <path> <query>`: build, then print the ranked chunks.
pub async fn run_retrieve(config: &Config, path: &str, query: &str) -> Result<()> {
    let mut engine = engine_with(config, Arc::new(generation::DisabledGenerator))?;
    build_index(&mut engine, path).await?;
    let results = engine.retrieve(query).await?;
    print_results(&results);
    Ok(())
}

fn print_results(results: &RetrievalResult) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        println!(
            "{}. [{:.4}] {} (page {})",
            i + 1,
            result.score,
            chunk.source,
            chunk.page_number
        );
        println!("    chunk: {} ({}..{})", chunk.chunk_index, chunk.start, chunk.end);
        println!("    excerpt: \"{}\"", excerpt(&chunk.text));
        println!("    id: {}", chunk.id);
        println!();
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat.to_string(),
    }
}

fn generator(config: &Config) -> Result<AnswerGenerator> {
    Ok(AnswerGenerator::new(
        generation_backend(config)?,
        config.generation_options(),
        tracer_for(&config.trace),
        config.trace.context(),
    ))
}

/// `rag ask <question>`: send the question to the model as-is.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let out = single_prompt().run(&generator(config)?, question).await?;
    println!("{}", out.trim());
    Ok(())
}

/// `rag chain <topic>`: report on the topic, then a five-point summary.
pub async fn run_chain(config: &Config, topic: &str) -> Result<()> {
    let chain = report_then_summary(None, Some(SUMMARY_TEMPERATURE));
    let out = chain.run(&generator(config)?, topic).await?;
    println!("{}", out.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let text = "é".repeat(EXCERPT_CHARS + 10);
        let out = excerpt(&text);
        assert_eq!(out.chars().count(), EXCERPT_CHARS + 1);
        assert!(out.ends_with('…'));
        assert_eq!(excerpt("a\nb"), "a b");
    }
}
