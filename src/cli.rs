//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bookmeta_core::DEFAULT_CONCURRENCY;

/// Resolve bibliographic metadata for books by ISBN.
///
/// Bookmeta queries a tiered set of external catalogs, caches what it finds,
/// and prints one resolved record per identifier.
#[derive(Parser, Debug)]
#[command(name = "bookmeta")]
#[command(author, version, about)]
pub struct Args {
    /// ISBNs to resolve (10 or 13 digits, punctuation ignored); reads stdin
    /// when omitted
    pub isbns: Vec<String>,

    /// Path to the cache database (in-memory when omitted)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Document-origin hint consulted by the publisher-override table
    #[arg(long)]
    pub hint: Option<String>,

    /// ISBNdb API key (the ISBNdb source is disabled without one)
    #[arg(long, env = "ISBNDB_API_KEY", hide_env_values = true)]
    pub isbndb_key: Option<String>,

    /// Re-resolve every cached entry instead of reading new identifiers
    #[arg(long)]
    pub rescan: bool,

    /// Maximum concurrent resolutions (1-32)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: u8,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
