//! snapledger CLI
//!
//! Maintenance tools for a file-backed snapledger store. The tool only
//! reads; it never fetches from providers or applies a sync pass.
//!
//! # Commands
//!
//! - `inspect` - Display per-kind row counts and watermarks
//! - `history` - Print the intervals of one resource
//! - `verify` - Cross-check current and history tables
//! - `stale` - List the resources a reconciliation would retire

mod commands;

use clap::{Parser, Subcommand};
use snapledger_storage::Timestamp;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// snapledger command-line store tools.
#[derive(Parser)]
#[command(name = "snapledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// Display per-kind row counts and watermarks
    Inspect {
        /// Only inspect this resource kind
        #[arg(short, long)]
        kind: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the history intervals of one resource
    History {
        /// Resource kind
        kind: String,

        /// Resource identifier
        resource_id: String,

        /// Only print the interval valid at this RFC 3339 instant
        #[arg(short, long)]
        at: Option<Timestamp>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify ledger consistency
    Verify {
        /// Only verify this resource kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// List resources that reconciliation would retire (dry run)
    Stale {
        /// Resource kind
        kind: String,

        /// Staleness watermark (RFC 3339)
        watermark: Timestamp,

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
        Commands::Inspect { kind, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, kind.as_deref(), &format)?;
        }
        Commands::History {
            kind,
            resource_id,
            at,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for history")?;
            commands::history::run(&path, &kind, &resource_id, at, &format)?;
        }
        Commands::Verify { kind } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, kind.as_deref())?;
        }
        Commands::Stale {
            kind,
            watermark,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for stale")?;
            commands::stale::run(&path, &kind, watermark, &format)?;
        }
        Commands::Version => {
            println!("snapledger CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("snapledger core v{}", snapledger_core::VERSION);
        }
    }

    Ok(())
}
