//! CLI entry point for the bookmeta resolver.

use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use bookmeta_core::{
    Database, HealthTracker, MetadataCache, Orchestrator, Resolution, ResolveConfig,
    ResolveEngine, build_default_source_registry,
};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = match &args.config {
        Some(path) => ResolveConfig::from_file(path)?,
        None => ResolveConfig::default(),
    };

    let db = match &args.db {
        Some(path) => Database::new(path).await?,
        None => Database::new_in_memory().await?,
    };
    let cache = MetadataCache::new(db, config.fresh_window());

    let registry = build_default_source_registry(args.isbndb_key.as_deref());
    let orchestrator = Orchestrator::new(
        cache,
        Arc::new(HealthTracker::new()),
        Arc::new(registry),
        config,
    );
    let engine = ResolveEngine::new(Arc::new(orchestrator), usize::from(args.concurrency))?;

    if args.rescan {
        let refreshed = engine.rescan().await?;
        println!("rescan: {refreshed} entries re-resolved");
        return Ok(());
    }

    // Read input: from positional args or stdin
    let identifiers: Vec<String> = if args.isbns.is_empty() {
        if io::stdin().is_terminal() {
            info!("No input provided. Pipe ISBNs via stdin or pass as arguments.");
            info!("Example: echo '9780134685991' | bookmeta");
            return Ok(());
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()
    } else {
        args.isbns.clone()
    };

    if identifiers.is_empty() {
        info!("No identifiers found in input");
        return Ok(());
    }

    let results = engine.resolve_many(&identifiers, args.hint.as_deref()).await?;

    for (raw, outcome) in &results {
        match outcome {
            Ok(Resolution::Found(record)) => {
                println!(
                    "{raw}: {} - {} ({}, {}) [{} {:.2}]",
                    record.title,
                    record.authors_joined(),
                    record.publisher,
                    record.published,
                    record.source,
                    record.confidence,
                );
            }
            Ok(Resolution::Absent) => println!("{raw}: not found"),
            Err(error) => println!("{raw}: error: {error}"),
        }
    }

    let stats = engine.stats();
    info!(
        resolved = stats.resolved(),
        absent = stats.absent(),
        failed = stats.failed(),
        total = results.len(),
        "Resolution complete"
    );

    Ok(())
}
