//! CLI command implementations
//!
//! `serve` is a thin adapter: it owns no durability logic of its own, it
//! only turns JSON lines into submissions and outcomes back into JSON
//! lines, in request order.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::wal::{
    CommitTicket, EngineConfig, EngineReport, LogReader, LogRecord, Outcome, WalEngine,
};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};

/// One request line on stdin.
#[derive(Debug, Deserialize)]
struct WriteLine {
    /// Echoed back on the response line when present
    #[serde(default)]
    id: Option<Value>,
    key: String,
    value: String,
    #[serde(default)]
    base_version: u64,
}

/// A response slot, kept in request order.
enum PendingResponse {
    Ticket { id: Option<Value>, ticket: CommitTicket },
    Ready(Value),
}

/// Main CLI entry point
///
/// Parses arguments, installs the log subscriber and dispatches. This is
/// the only function main.rs calls.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_json);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config, log } => init(&config, &log),
        Command::Serve { config } => serve(&config),
        Command::Inspect { log } => inspect(&log),
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded; keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Write a default configuration file pointing at `log_path`.
pub fn init(config_path: &Path, log_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path));
    }

    let config = EngineConfig::new(log_path);
    config.validate()?;

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                CliError::config_error(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
    }

    let content = serde_json::to_string_pretty(&config)?;
    fs::write(config_path, content).map_err(|e| {
        CliError::config_error(format!("Failed to write {:?}: {}", config_path, e))
    })?;

    write_response(json!({"initialized": true, "config": config}))?;
    Ok(())
}

/// Open the engine and serve write requests from stdin until end of input
/// or Ctrl-C, then close and print the final report.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = EngineConfig::load(config_path)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::engine_failed(format!("Failed to create tokio runtime: {}", e)))?;

    runtime.block_on(serve_requests(config))
}

async fn serve_requests(config: EngineConfig) -> CliResult<()> {
    let engine = WalEngine::open(&config)?;

    let (responses_tx, mut responses_rx) = mpsc::unbounded_channel::<PendingResponse>();
    let responder = tokio::spawn(async move {
        while let Some(pending) = responses_rx.recv().await {
            let line = match pending {
                PendingResponse::Ticket { id, ticket } => outcome_line(id, ticket.wait().await),
                PendingResponse::Ready(line) => line,
            };
            write_json(&line)?;
        }
        Ok::<(), CliError>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut ctrl_c => {
                info!("interrupt received; shutting down");
                break;
            }
        };
        let Some(line) = line else {
            info!("end of input; shutting down");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let pending = match serde_json::from_str::<WriteLine>(&line) {
            Ok(request) => {
                match engine
                    .submit(request.key, request.value, request.base_version)
                    .await
                {
                    Ok(ticket) => PendingResponse::Ticket {
                        id: request.id,
                        ticket,
                    },
                    Err(e) => {
                        PendingResponse::Ready(error_line(request.id, e.code(), &e.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed request line");
                PendingResponse::Ready(error_line(None, "INVALID_REQUEST", &e.to_string()))
            }
        };

        if responses_tx.send(pending).is_err() {
            break;
        }
    }

    drop(responses_tx);
    let closed = engine.close().await;
    let responded = responder
        .await
        .map_err(|e| CliError::io_error(format!("response writer failed: {}", e)))?;

    let report = closed?;
    responded?;
    write_response(report_json(&report))?;
    Ok(())
}

/// Print every record of the log at `log_path`, then a summary line.
pub fn inspect(log_path: &Path) -> CliResult<()> {
    let reader = LogReader::open(log_path)?;
    let mut records = 0u64;
    let mut last_lsn = 0u64;

    for record in reader {
        let record = record?;
        records += 1;
        last_lsn = record.lsn;
        write_json(&record_json(&record))?;
    }

    write_response(json!({"records": records, "last_lsn": last_lsn}))?;
    Ok(())
}

fn outcome_line(id: Option<Value>, outcome: Outcome) -> Value {
    match outcome {
        Outcome::Committed { lsn, version } => {
            let mut line = Map::new();
            if let Some(id) = id {
                line.insert("id".into(), id);
            }
            line.insert("status".into(), json!("ok"));
            line.insert("data".into(), json!({"lsn": lsn, "version": version}));
            Value::Object(line)
        }
        other => {
            let code = other.code().unwrap_or("UNKNOWN");
            let mut line = error_line(id, code, &other.to_string());
            if let (Outcome::VersionConflict { current_version }, Value::Object(map)) =
                (other, &mut line)
            {
                map.insert("current_version".into(), json!(current_version));
            }
            line
        }
    }
}

fn error_line(id: Option<Value>, code: &str, message: &str) -> Value {
    let mut line = Map::new();
    if let Some(id) = id {
        line.insert("id".into(), id);
    }
    line.insert("status".into(), json!("error"));
    line.insert("code".into(), json!(code));
    line.insert("message".into(), json!(message));
    Value::Object(line)
}

fn record_json(record: &LogRecord) -> Value {
    let operations: Vec<Value> = record
        .operations
        .iter()
        .map(|op| {
            json!({
                "key": String::from_utf8_lossy(&op.key),
                "value": String::from_utf8_lossy(&op.value),
                "version": op.version,
            })
        })
        .collect();
    json!({"lsn": record.lsn, "operations": operations})
}

fn report_json(report: &EngineReport) -> Value {
    json!({
        "closed": true,
        "last_lsn": report.last_lsn,
        "keys": report.versions.len(),
        "metrics": report.metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{LogOperation, LogWriter, SubmitError};
    use tempfile::TempDir;

    #[test]
    fn test_committed_line() {
        let line = outcome_line(Some(json!(7)), Outcome::Committed { lsn: 3, version: 2 });
        assert_eq!(
            line,
            json!({"id": 7, "status": "ok", "data": {"lsn": 3, "version": 2}})
        );
    }

    #[test]
    fn test_conflict_line_carries_current_version() {
        let line = outcome_line(None, Outcome::VersionConflict { current_version: 4 });
        assert_eq!(line["status"], "error");
        assert_eq!(line["code"], "VERSION_CONFLICT");
        assert_eq!(line["current_version"], 4);
        assert!(line.get("id").is_none());
    }

    #[test]
    fn test_io_failure_line() {
        let line = outcome_line(None, Outcome::IoFailure);
        assert_eq!(line["code"], "IO_FAILURE");
    }

    #[test]
    fn test_submit_error_line_uses_error_code() {
        let err = SubmitError::TooLarge(5_000_000_000);
        let line = error_line(Some(json!("w1")), err.code(), &err.to_string());
        assert_eq!(line["id"], "w1");
        assert_eq!(line["code"], "TOO_LARGE");
        assert_eq!(error_line(None, SubmitError::ShuttingDown.code(), "")["code"], "SHUTTING_DOWN");
    }

    #[test]
    fn test_request_line_defaults_base_version() {
        let request: WriteLine = serde_json::from_str(r#"{"key":"a","value":"1"}"#).unwrap();
        assert_eq!(request.base_version, 0);
        assert!(request.id.is_none());
    }

    #[test]
    fn test_record_json() {
        let record = LogRecord::new(5, vec![LogOperation::new("k", "v", 9)]);
        assert_eq!(
            record_json(&record),
            json!({"lsn": 5, "operations": [{"key": "k", "value": "v", "version": 9}]})
        );
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("conf").join("groupwal.json");
        let log_path = temp_dir.path().join("wal.log");

        init(&config_path, &log_path).unwrap();

        let config = EngineConfig::load(&config_path).unwrap();
        assert_eq!(config.log_path, log_path);
        assert!(init(&config_path, &log_path).is_err());
    }

    #[test]
    fn test_inspect_reads_written_log() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("wal.log");
        {
            let mut writer = LogWriter::open(&log_path).unwrap();
            writer.write_batch(vec![LogOperation::new("a", "1", 1)]).unwrap();
        }

        assert!(inspect(&log_path).is_ok());
    }
}
