//! CLI argument definitions using clap
//!
//! Commands:
//! - groupwal init --config <path>
//! - groupwal serve --config <path>
//! - groupwal inspect --log <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// groupwal - group-commit write-ahead log
#[derive(Parser, Debug)]
#[command(name = "groupwal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./groupwal.json")]
        config: PathBuf,

        /// Log file path recorded in the new configuration
        #[arg(long, default_value = "./data/groupwal.log")]
        log: PathBuf,
    },

    /// Open the engine and serve JSON-lines write requests from stdin
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./groupwal.json")]
        config: PathBuf,
    },

    /// Print every record of a log file as a JSON line
    Inspect {
        /// Path to the log file
        #[arg(long)]
        log: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
