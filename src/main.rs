mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tichat::config::TichatConfig;
use tichat::server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tichat", version, about = "Chat with a local LLM and your own documents")]
struct Cli {
    /// Config file (default: ~/.tichat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// List saved chat sessions
    History,
    /// Add files or directories to the document index
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Check the inference server, models, index and session store
    Doctor,
    /// Manage models on the inference server
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Pull the configured chat and embedding models
    Pull,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TichatConfig::load_from(path)?,
        None => TichatConfig::load()?,
    };

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(config).await?,
        Command::History => cli::history::history(&config)?,
        Command::Ingest { paths } => cli::ingest::ingest(&config, &paths).await?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Model { action } => match action {
            ModelAction::Pull => cli::model_pull(&config.inference).await?,
        },
    }

    Ok(())
}
