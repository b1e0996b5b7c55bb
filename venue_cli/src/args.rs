//! Command-line arguments for the venue console.
use clap::Parser;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a venue configuration JSON file. The embedded simulated venue is used when omitted.
    #[clap(long)]
    pub config: Option<String>,

    /// Path to a text file with one entity per line (`EXCHANGE,COMMODITY,CONTRACT` or `EXCHANGE,INSTRUMENT`).
    #[clap(long)]
    pub topics: Option<String>,

    /// Quote field streamed for every entity.
    #[clap(long, default_value = "LastPrice")]
    pub field: String,

    /// Send a demo order and cancel after login, then print the account tables.
    #[clap(long)]
    pub orders_demo: bool,

    /// Append persisted fills and positions to this JSON-lines journal.
    #[clap(long)]
    pub journal: Option<String>,
}
