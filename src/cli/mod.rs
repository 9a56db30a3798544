//! CLI for groupwal
//!
//! - init: write a default configuration file
//! - serve: run the engine over JSON-lines requests on stdin
//! - inspect: dump the records of a log file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, init_logging, inspect, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_response};
