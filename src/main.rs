//! # pdf-rag CLI (`rag`)
//!
//! Builds an in-memory index from a document and answers questions about it,
//! or sends prompts straight to the configured model.
//!
//! ## Usage
//!
//! ```bash
//! rag [--config ./rag.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag pdf <path> [--question Q]` | Index a document, then answer one question |
//! | `rag retrieve <path> <query>` | Index a document and print the top-k chunks |
//! | `rag ask <question>` | Send one prompt to the model |
//! | `rag chain <topic>` | Report on a topic, then summarize the report |
//!
//! Answers go to stdout; logs go to stderr (`RUST_LOG` controls verbosity).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pdf_rag::{commands, config};

/// Answer questions about a PDF with retrieval-augmented generation.
///
/// Settings come from an optional TOML file; credentials come from the
/// environment (a `.env` file in the working directory is loaded first).
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Answer questions about a PDF with retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document, then answer one question about it.
    ///
    /// The question is read from stdin when `--question` is not given.
    Pdf {
        /// PDF or text file to index.
        path: String,

        /// Question to answer.
        #[arg(long, short)]
        question: Option<String>,

        /// Number of chunks to retrieve (overrides `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Index a document and print the chunks most similar to a query.
    ///
    /// Does not call the language model.
    Retrieve {
        /// PDF or text file to index.
        path: String,

        /// Query text.
        query: String,

        /// Number of chunks to retrieve (overrides `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Send a single prompt to the model.
    Ask {
        /// The question, sent as-is.
        question: String,
    },

    /// Generate a detailed report on a topic, then a five-point summary of it.
    Chain {
        /// Report topic.
        topic: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Pdf { path, question, k } => {
            if let Some(k) = k {
                cfg.retrieval.k = k;
            }
            commands::run_pdf(&cfg, &path, question).await?;
        }
        Commands::Retrieve { path, query, k } => {
            if let Some(k) = k {
                cfg.retrieval.k = k;
            }
            commands::run_retrieve(&cfg, &path, &query).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Chain { topic } => {
            commands::run_chain(&cfg, &topic).await?;
        }
    }

    Ok(())
}
