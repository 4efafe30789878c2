//! notesync CLI
//!
//! Command-line tools for the on-disk state of a notesync account.
//!
//! # Commands
//!
//! - `ranges` - List cached sync chunk ranges per scope
//! - `dump-chunk` - Print one cached sync chunk
//! - `clear-cache` - Delete cached sync chunks
//! - `records` - Summarize durable processing records
//! - `cleanup` - Delete durable processing records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// notesync sync state tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the account's persistent sync root
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached sync chunk ranges
    Ranges {
        /// Only this scope (user-own or linked-notebook:<guid>)
        #[arg(short, long)]
        scope: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one cached sync chunk as JSON
    DumpChunk {
        /// Scope of the chunk (user-own or linked-notebook:<guid>)
        #[arg(short, long, default_value = "user-own")]
        scope: String,

        /// Low USN of the chunk
        low: u32,

        /// High USN of the chunk
        high: u32,
    },

    /// Delete cached sync chunks
    ClearCache {
        /// Only this scope; all scopes if omitted
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Summarize durable processing records
    Records {
        /// Only this scope
        #[arg(short, long)]
        scope: Option<String>,

        /// Only this entity kind (notebook, tag, saved_search, note, resource)
        #[arg(short, long)]
        kind: Option<String>,

        /// List guids instead of counts
        #[arg(short, long)]
        list: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete durable processing records after a completed sync
    Cleanup {
        /// Only this scope; all scopes if omitted
        #[arg(short, long)]
        scope: Option<String>,

        /// Dry run - show what would be deleted
        #[arg(short, long)]
        dry_run: bool,
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
        Commands::Ranges { scope, format } => {
            let path = cli.path.ok_or("Sync root path required for ranges")?;
            commands::ranges::run(&path, scope.as_deref(), &format)?;
        }
        Commands::DumpChunk { scope, low, high } => {
            let path = cli.path.ok_or("Sync root path required for dump-chunk")?;
            commands::dump_chunk::run(&path, &scope, low, high)?;
        }
        Commands::ClearCache { scope } => {
            let path = cli.path.ok_or("Sync root path required for clear-cache")?;
            commands::clear_cache::run(&path, scope.as_deref())?;
        }
        Commands::Records {
            scope,
            kind,
            list,
            format,
        } => {
            let path = cli.path.ok_or("Sync root path required for records")?;
            commands::records::run(&path, scope.as_deref(), kind.as_deref(), list, &format)?;
        }
        Commands::Cleanup { scope, dry_run } => {
            let path = cli.path.ok_or("Sync root path required for cleanup")?;
            commands::cleanup::run(&path, scope.as_deref(), dry_run)?;
        }
        Commands::Version => {
            println!("notesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
