//! LiveData CLI
//!
//! Command-line tools for running and debugging a LiveData server.
//!
//! # Commands
//!
//! - `serve` - Serve a seeded in-memory data source over TCP
//! - `diff` - Show the change events between two snapshot files
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LiveData command-line tools.
#[derive(Parser)]
#[command(name = "livedata")]
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
    /// Serve a seeded in-memory data source over TCP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3030")]
        bind: SocketAddr,

        /// Seed file with collections and publications
        #[arg(short, long)]
        seed: Option<PathBuf>,

        /// Periodic re-poll interval in milliseconds
        #[arg(long, default_value = "10000")]
        poll_interval_ms: u64,

        /// Throttle window for triggered polls in milliseconds
        #[arg(long, default_value = "50")]
        throttle_ms: u64,

        /// Maximum concurrent connections
        #[arg(long, default_value = "1000")]
        max_connections: usize,
    },

    /// Show the change events between two snapshot files
    Diff {
        /// Snapshot the client holds
        old: PathBuf,

        /// Snapshot the server computed
        new: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            seed,
            poll_interval_ms,
            throttle_ms,
            max_connections,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                seed,
                poll_interval_ms,
                throttle_ms,
                max_connections,
            };
            commands::serve::run(options)?;
        }
        Commands::Diff { old, new, format } => {
            commands::diff::run(&old, &new, &format)?;
        }
        Commands::Version => {
            println!("LiveData CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Wire protocol: newline-delimited JSON");
        }
    }

    Ok(())
}
