//! JSON-lines output for the CLI
//!
//! One JSON object per line on stdout, UTF-8 only. Logs go to stderr so
//! stdout stays machine-readable.

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Write a success response line
pub fn write_response(data: Value) -> CliResult<()> {
    write_json(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write a raw JSON value line
pub fn write_json(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
