//! pgrespawn - Fast, cache-backed resets of PostgreSQL test databases
//!
//! This is the command-line entry point. The actual logic is in the library
//! for better testability.

use anyhow::{Context, Result};
use clap::Parser;
use pgrespawn::config::{load_options, load_options_from};
use pgrespawn::{Checkpoint, ResetOutcome};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Reset a PostgreSQL test database, using a template cache when possible
#[derive(Debug, Parser)]
#[command(name = "pgrespawn", version, about)]
struct Cli {
    /// Target database (postgres:// URL or libpq key=value string)
    connection: String,

    /// Only reset tables in these schemas (repeatable)
    #[arg(long = "schema")]
    schemas_to_include: Vec<String>,

    /// Never reset tables in these schemas (repeatable)
    #[arg(long = "exclude-schema")]
    schemas_to_exclude: Vec<String>,

    /// Leave this table alone, as `table` or `schema.table` (repeatable)
    #[arg(long = "ignore-table")]
    tables_to_ignore: Vec<String>,

    /// Per-statement timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    command_timeout: Option<u64>,

    /// Create the configured extensions before touching the cache
    #[arg(long)]
    auto_create_extensions: bool,

    /// Options file (defaults to ~/.pgrespawn/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgrespawn=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => load_options_from(path),
        None => load_options(),
    }
    .context("failed to load options")?;

    // Flags extend or override the file
    options.schemas_to_include.extend(cli.schemas_to_include);
    options.schemas_to_exclude.extend(cli.schemas_to_exclude);
    options.tables_to_ignore.extend(cli.tables_to_ignore);
    if cli.command_timeout.is_some() {
        options.command_timeout = cli.command_timeout;
    }
    options.auto_create_extensions |= cli.auto_create_extensions;

    let checkpoint = Checkpoint::postgres(options);
    let outcome = checkpoint
        .reset(&cli.connection)
        .await
        .context("reset failed")?;

    match outcome {
        ResetOutcome::CacheHit => println!("restored from cache"),
        ResetOutcome::Rebuilt => println!("reset and cache rebuilt"),
    }

    Ok(())
}
