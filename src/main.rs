//! # doc-qa CLI (`docqa`)
//!
//! Builds document indexes, answers questions from them, and serves
//! question-answering sessions over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa index build <file>` | Extract, chunk, embed, and save an index |
//! | `docqa index info` | Print index file metadata |
//! | `docqa ask "<question>"` | Answer one question from a saved index |
//! | `docqa chat [<file>]` | Interactive question loop (`exit` quits) |
//! | `docqa chunk <file>` | Show how a document would be chunked |
//! | `docqa serve` | Start the HTTP session server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`);
//! answers and reports go to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_qa::config::{self, Config};
use doc_qa::embedding::create_provider;
use doc_qa::extract::extract_file;
use doc_qa::generation::create_generator;
use doc_qa::session::{Answer, Session, SessionConfig};
use doc_qa::{server, storage};
use doc_qa_core::chunk::Chunker;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Characters of each source chunk shown under an answer.
const SNIPPET_CHARS: usize = 150;

/// doc-qa CLI: ask questions about a long document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "doc-qa: retrieval-augmented question answering over long documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or inspect index files.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer a single question from a saved index.
    Ask {
        /// The question.
        question: String,

        /// Index file (defaults to `[index].path`).
        #[arg(long)]
        index: Option<PathBuf>,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Interactive question loop over a document or a saved index.
    ///
    /// Type `exit` to quit. Errors are printed and the loop continues.
    Chat {
        /// Document to ingest (PDF or text). Omit to use `--index`.
        file: Option<PathBuf>,

        /// Index file (defaults to `[index].path`). Ignored when a file is given.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Dry run: show how a document splits into chunks.
    Chunk {
        /// Document (PDF or text).
        file: PathBuf,

        /// Print chunks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP session server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Extract, chunk, embed, and save a document index.
    Build {
        /// Document (PDF or text).
        file: PathBuf,

        /// Output path (defaults to `[index].path`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print metadata of an index file without loading its vectors.
    Info {
        /// Index file (defaults to `[index].path`).
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { action } => match action {
            IndexAction::Build { file, out } => {
                let out = out.unwrap_or_else(|| cfg.index.path.clone());
                run_index_build(&cfg, &file, &out).await?;
            }
            IndexAction::Info { index } => {
                let path = index.unwrap_or_else(|| cfg.index.path.clone());
                run_index_info(&path)?;
            }
        },
        Commands::Ask { question, index, k } => {
            let path = index.unwrap_or_else(|| cfg.index.path.clone());
            run_ask(&cfg, &path, &question, k).await?;
        }
        Commands::Chat { file, index } => {
            let path = index.unwrap_or_else(|| cfg.index.path.clone());
            run_chat(&cfg, file.as_deref(), &path).await?;
        }
        Commands::Chunk { file, json } => {
            run_chunk(&cfg, &file, json)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn build_session(cfg: &Config, top_k: Option<usize>) -> Result<Session> {
    let mut session_config = SessionConfig::from_config(cfg);
    if let Some(k) = top_k {
        session_config.top_k = k;
    }
    let embedder = create_provider(&cfg.embedding)?;
    let generator = create_generator(&cfg.generation)?;
    Ok(Session::new(session_config, embedder, generator)?)
}

fn read_document(file: &Path) -> Result<String> {
    extract_file(file).with_context(|| format!("Failed to extract text from {}", file.display()))
}

async fn run_index_build(cfg: &Config, file: &Path, out: &Path) -> Result<()> {
    let session = build_session(cfg, None)?;
    let text = read_document(file)?;
    let report = session.ingest(&text).await?;
    session.save_index(out)?;

    println!("Indexed {} ({} chunks)", file.display(), report.chunks);
    println!("  model: {} ({} dims)", report.model, report.dims);
    println!("  saved: {}", out.display());
    Ok(())
}

fn run_index_info(path: &Path) -> Result<()> {
    let info = storage::index_info(path)?;
    println!("Index: {}", path.display());
    println!("  format version: {}", info.format_version);
    println!("  model:          {}", info.embedding_model);
    println!("  dims:           {}", info.dims);
    println!("  metric:         {}", info.metric);
    println!("  chunks:         {}", info.count);
    println!("  created:        {}", info.created_at.to_rfc3339());
    Ok(())
}

async fn run_ask(cfg: &Config, index: &Path, question: &str, k: Option<usize>) -> Result<()> {
    let session = build_session(cfg, k)?;
    session.load_index(index)?;
    let answer = session.answer(question).await?;
    print_answer(&answer);
    Ok(())
}

async fn run_chat(cfg: &Config, file: Option<&Path>, index: &Path) -> Result<()> {
    let session = build_session(cfg, None)?;
    match file {
        Some(file) => {
            let text = read_document(file)?;
            let report = session.ingest(&text).await?;
            println!("Loaded {} ({} chunks).", file.display(), report.chunks);
        }
        None => {
            let n = session.load_index(index)?;
            println!("Loaded index {} ({} chunks).", index.display(), n);
        }
    }
    println!("Ask a question (type 'exit' to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match session.answer(question).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}

fn run_chunk(cfg: &Config, file: &Path, json: bool) -> Result<()> {
    let chunker = Chunker::new(cfg.chunking.chunker_config())?;
    let text = read_document(file)?;
    let chunks = chunker.split(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{}: {} chars → {} chunks (size {}, overlap {}, {:?})",
        file.display(),
        text.chars().count(),
        chunks.len(),
        cfg.chunking.chunk_size,
        cfg.chunking.chunk_overlap,
        cfg.chunking.strategy
    );
    for chunk in &chunks {
        println!(
            "  [{}] @{} ({} chars) {}",
            chunk.index,
            chunk.source_offset.unwrap_or(0),
            chunk.char_len(),
            snippet(&chunk.text, 60)
        );
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("Answer: {}", answer.text);
    if !answer.citations.is_empty() {
        println!("\nSources:");
        for (rank, hit) in answer.citations.iter().enumerate() {
            println!(
                "  {}. [chunk {}, score {:.3}] {}",
                rank + 1,
                hit.chunk_index,
                hit.score,
                snippet(&hit.text, SNIPPET_CHARS)
            );
        }
    }
}

/// First `max` characters of `text` on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
