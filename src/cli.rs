use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_LINK_PATTERN, DEFAULT_LISTING_URL};
use crate::render::OutputFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk the listing, extract every incident report, and print the records.
    Retrieve(RetrieveArgs),
}

#[derive(Debug, Args)]
pub struct RetrieveArgs {
    /// Listing URL (must be http/https).
    #[arg(long, default_value = DEFAULT_LISTING_URL)]
    pub url: String,

    /// Regex selecting detail-page links on listing pages.
    #[arg(long, default_value = DEFAULT_LINK_PATTERN)]
    pub link_pattern: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Earliest incident date to keep ("Jan 2019", "01/15/2019", ...).
    #[arg(long)]
    pub from: Option<String>,

    /// Latest incident date to keep; a month alone means its last day.
    #[arg(long)]
    pub to: Option<String>,

    /// Maximum listing pages to visit.
    #[arg(long)]
    pub pages: Option<u32>,

    /// Attempts per page, including the first.
    #[arg(long, default_value_t = 3)]
    pub attempts: u32,

    /// Delay before the first retry.
    #[arg(long, default_value_t = 3000)]
    pub backoff_ms: u64,

    #[arg(long, default_value_t = 2.0)]
    pub backoff_multiplier: f64,

    /// Maximum concurrent detail-page fetches.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-attempt timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Print records in listing order instead of completion order.
    #[arg(long)]
    pub ordered: bool,
}
