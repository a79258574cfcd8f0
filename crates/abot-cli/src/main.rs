//! `abot` -- CLI binary for the abot assistant core.
//!
//! Provides the following subcommands:
//!
//! - `abot server` -- Run the plugin RPC endpoint and the HTTP front-end.
//! - `abot console` -- Chat with a running server from the terminal.
//! - `abot train` -- Build an intent model from an annotated corpus.

use clap::{Parser, Subcommand};

mod commands;

/// abot assistant CLI.
#[derive(Parser)]
#[command(name = "abot", about = "abot assistant CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the core: plugin RPC endpoint plus HTTP front-end.
    Server(commands::server::ServerArgs),

    /// Send lines from stdin to a running server and print the replies.
    Console(commands::console::ConsoleArgs),

    /// Train an intent model from an annotated corpus.
    Train(commands::train::TrainArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Server(args) => commands::server::run(args).await?,
        Commands::Console(args) => commands::console::run(args).await?,
        Commands::Train(args) => commands::train::run(args).await?,
    }

    Ok(())
}
