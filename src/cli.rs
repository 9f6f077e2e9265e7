//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "newscrawl",
    about = "News source discovery and article pipeline orchestration",
    version
)]
pub struct Cli {
    /// Override the data directory from config.
    #[arg(long, env = "NEWSCRAWL_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one discovery pass over registered sources. By default every
    /// enabled source is processed.
    Discover {
        /// Dataset new candidates are attached to.
        #[arg(long)]
        dataset: String,

        /// Only process sources due per their interval and failure
        /// backoff.
        #[arg(long)]
        due_only: bool,

        /// Process at most this many sources.
        #[arg(long)]
        source_limit: Option<usize>,

        /// Sources fetched concurrently (defaults to config).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run the maintenance sweep: pause null-text articles, expire old
    /// candidates, report stalls.
    Housekeeping {
        /// Candidates older than this many days are expired.
        #[arg(long, default_value_t = 7)]
        candidate_expiration_days: i64,

        /// Hours in `candidate` before an article counts as an
        /// extraction stall.
        #[arg(long, default_value_t = 24)]
        extraction_stall_hours: i64,

        /// Hours in `extracted` before a cleaning stall.
        #[arg(long, default_value_t = 24)]
        cleaning_stall_hours: i64,

        /// Hours in `cleaned` before a verification stall.
        #[arg(long, default_value_t = 24)]
        verification_stall_hours: i64,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
}
