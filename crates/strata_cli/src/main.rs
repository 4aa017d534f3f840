//! Strata CLI
//!
//! Command-line tools for inspecting Strata journals.
//!
//! # Commands
//!
//! - `info` - Summarize the journal files and what recovery would do
//! - `dump` - Print the records of a journal file
//! - `verify` - Check every journal file for corruption and protocol errors

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Strata journal tools.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Journal directory, if not the data directory (relative paths are
    /// resolved against it)
    #[arg(global = true, short, long)]
    journal: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the journal files and what recovery would do
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of a journal file
    Dump {
        /// Journal file number (defaults to the newest)
        #[arg(long)]
        file: Option<u32>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print records of this transaction
        #[arg(short, long)]
        txn: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every journal file for corruption and protocol errors
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { format } => {
            let dir = commands::journal_dir(cli.path, cli.journal, "info")?;
            commands::info::run(&dir, &format)?;
        }
        Commands::Dump {
            file,
            limit,
            txn,
            format,
        } => {
            let dir = commands::journal_dir(cli.path, cli.journal, "dump")?;
            commands::dump::run(&dir, file, limit, txn, &format)?;
        }
        Commands::Verify => {
            let dir = commands::journal_dir(cli.path, cli.journal, "verify")?;
            commands::verify::run(&dir)?;
        }
        Commands::Version => {
            println!("Strata CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Strata Core v{}", strata_core::VERSION);
            println!(
                "Journal format v{}",
                strata_core::journal::JOURNAL_VERSION
            );
        }
    }

    Ok(())
}
