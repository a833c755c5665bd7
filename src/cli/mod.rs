use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "navrank")]
#[command(
    version,
    about = "Mutual fund NAV tracker with trailing 12-month XIRR leaderboards"
)]
#[command(
    long_about = "Keeps a local, sharded copy of daily NAV history for every mutual fund scheme, refreshes it incrementally from the MFAPI provider, and ranks Direct growth plans by trailing 12-month XIRR, overall and per category."
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the NAV store (overrides config)
    #[arg(long = "data-dir", global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync every scheme, compute returns and print the leaderboards
    Run {
        /// Only consider the first N schemes of the provider list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Compute returns as of this date (YYYY-MM-DD, YYYY-MM or YYYY)
        #[arg(long = "as-of")]
        as_of: Option<String>,

        /// Save the run as report_<date>.json in the reports directory
        #[arg(long)]
        save: bool,
    },

    /// Refresh one scheme's stored NAV history
    Sync {
        /// Scheme code
        scheme: String,
    },

    /// Trailing 12-month XIRR from stored history (no network)
    Xirr {
        /// Scheme code
        scheme: String,

        /// Compute as of this date (YYYY-MM-DD, YYYY-MM or YYYY)
        #[arg(long = "as-of")]
        as_of: Option<String>,
    },

    /// Summarize a scheme's stored NAV history
    History {
        /// Scheme code
        scheme: String,
    },

    /// Latest NAV published by the provider
    Latest {
        /// Scheme code
        scheme: String,
    },
}
