//! Keyrepo CLI - inspection and maintenance of on-disk key repositories.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "keyrepo")]
#[command(about = "Inspect and maintain code-model key repositories", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository directory
    #[arg(short = 'C', long, global = true, default_value = ".keyrepo")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository with the default configuration
    Init,
    /// List units with their ids and entry counts
    Units {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Decode and print every key of a unit
    Dump {
        /// Unit name or numeric id
        unit: String,
        /// Also print each value as hex
        #[arg(long)]
        values: bool,
    },
    /// Decode every stored key and decompress every value
    Verify,
    /// Delete every persisted entry of a unit
    Wipe {
        /// Unit name or numeric id
        unit: String,
    },
    /// Print the persistence version
    Version,
}

fn main() -> Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=keyrepo_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::run(&cli.repo),
        Commands::Units { json } => commands::units::run(&cli.repo, json),
        Commands::Dump { unit, values } => commands::dump::run(&cli.repo, &unit, values),
        Commands::Verify => commands::verify::run(&cli.repo),
        Commands::Wipe { unit } => commands::wipe::run(&cli.repo, &unit),
        Commands::Version => commands::version::run(&cli.repo),
    }
}
