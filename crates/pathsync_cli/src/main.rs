//! PathSync CLI
//!
//! Offline tools for inspecting sync client and sync path state.
//!
//! # Commands
//!
//! - `plan` - Dry-run reconciliation of a client snapshot against server records
//! - `token-status` - Classify a client token expiration
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PathSync command-line tools.
#[derive(Parser)]
#[command(name = "pathsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a reconciliation pass would do, without touching any store
    Plan {
        /// JSON file with the server records and their current resolution
        #[arg(short, long)]
        server: PathBuf,

        /// JSON file with the client snapshot
        #[arg(short, long)]
        client: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Classify a client token expiration under the default policy
    TokenStatus {
        /// Token expiration (Unix seconds)
        #[arg(short, long)]
        expires_at: u64,

        /// Reference time (Unix seconds), defaults to now
        #[arg(short, long)]
        now: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Plan {
            server,
            client,
            format,
        } => {
            commands::plan::run(&server, &client, &format)?;
        }
        Commands::TokenStatus {
            expires_at,
            now,
            format,
        } => {
            commands::token_status::run(expires_at, now, &format)?;
        }
        Commands::Version => {
            println!("PathSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Token length: {} characters", pathsync_server::TOKEN_LENGTH);
        }
    }

    Ok(())
}
