//! Patchloop CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive session (the default)
//! - `onboard`  — Write a default config file
//! - `doctor`   — Check configuration and the execution environment

use clap::{Parser, Subcommand};

mod commands;
mod transcript;

#[derive(Parser)]
#[command(
    name = "patchloop",
    about = "Patchloop — a terminal coding agent that edits your project through search/replace patches",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent in the current directory
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write a default configuration file
    Onboard,

    /// Diagnose configuration and environment
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Chat { message: None }) {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Onboard => commands::onboard::run()?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
