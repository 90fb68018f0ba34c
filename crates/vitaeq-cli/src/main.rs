//! Vitaeq CLI
//!
//! Ask questions against a resume knowledge base served by local
//! inference services.

use anyhow::Result;
use clap::Parser;

mod app;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = app::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask(args) => app::run_ask(args, config).await,
        Commands::Repl(args) => app::run_repl(args, config).await,
    }
}
