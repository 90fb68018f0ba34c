//! CLI argument definitions and command implementations

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vitaeq_core::{
    BackendSet, Chunk, ChunkMetadata, ConversationTurn, QueryOptions, ResponseStyle, Router,
    RouterConfig,
};

#[derive(Parser)]
#[command(name = "vitaeq")]
#[command(author, version, about = "Resume Q&A over local inference services")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON router configuration; defaults to environment
    /// variables and built-in values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a single question
    Ask(AskArgs),

    /// Interactive question loop
    Repl(ReplArgs),
}

#[derive(Args)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Path to the knowledge chunk file (JSON array)
    #[arg(long)]
    pub chunks: PathBuf,

    /// Response style: developer, hr, or friend
    #[arg(long, default_value = "developer")]
    pub style: ResponseStyle,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ReplArgs {
    /// Path to the knowledge chunk file (JSON array)
    #[arg(long)]
    pub chunks: PathBuf,

    /// Response style: developer, hr, or friend
    #[arg(long, default_value = "developer")]
    pub style: ResponseStyle,
}

/// Flat chunk entry as it appears in knowledge files
#[derive(Deserialize)]
struct ChunkEntry {
    id: String,
    text: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(RouterConfig::default()),
    }
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading chunks {}", path.display()))?;
    let entries: Vec<ChunkEntry> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|e| Chunk {
            id: e.id,
            text: e.text,
            embedding: None,
            metadata: ChunkMetadata {
                category: e.category,
                source: e.source,
            },
        })
        .collect())
}

async fn build_router(config: RouterConfig, chunks: Vec<Chunk>) -> Result<Router> {
    let factory_config = config.clone();
    let mut router = Router::new(
        config,
        Box::new(move || BackendSet::http(&factory_config)),
    )
    .with_progress(Arc::new(|service, percent| {
        tracing::info!("{}: {}%", service, percent);
    }));
    router.initialize(chunks).await?;
    Ok(router)
}

pub async fn run_ask(args: AskArgs, config: RouterConfig) -> Result<()> {
    let chunks = load_chunks(&args.chunks)?;
    let mut router = build_router(config, chunks).await?;

    let options = QueryOptions {
        style: args.style,
        recent_turns: Vec::new(),
    };
    let result = router.process_query(&args.question, &options).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.answer);
        println!(
            "  [{} | confidence {:.2} | {:?}]",
            result.method, result.confidence, result.processing_time
        );
    }

    router.cleanup();
    Ok(())
}

pub async fn run_repl(args: ReplArgs, config: RouterConfig) -> Result<()> {
    let chunks = load_chunks(&args.chunks)?;
    let mut router = build_router(config, chunks).await?;
    let mut turns: Vec<ConversationTurn> = Vec::new();

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("vitaeq ready; ask away (\"exit\" to quit)");

    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let options = QueryOptions {
            style: args.style,
            recent_turns: turns.clone(),
        };
        let result = router.process_query(question, &options).await;
        println!("{}", result.answer);
        println!("  [{} | confidence {:.2}]", result.method, result.confidence);

        turns.push(ConversationTurn {
            question: question.to_string(),
            answer: result.answer.clone(),
            matched_chunks: result.matched_chunks.clone(),
        });
        // Only the most recent turns feed back into preprocessing
        if turns.len() > 4 {
            turns.remove(0);
        }
    }

    router.cleanup();
    Ok(())
}
