//! Error types for the write path
//!
//! Error codes carried by [`WalError`]:
//! - WAL_APPEND_FAILED (ERROR severity)
//! - WAL_FSYNC_FAILED (ERROR severity, fails the in-flight batch only)
//! - WAL_REWIND_FAILED (FATAL severity)
//! - WAL_CORRUPTION (FATAL severity)
//! - WAL_RECORD_TOO_LARGE (ERROR severity, nothing is written)
//!
//! Submission-side and lifecycle errors are plain enums.

use std::fmt;
use std::io;

use thiserror::Error;

/// Severity levels for WAL errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The batch fails, the engine continues
    Error,
    /// The engine must stop accepting work
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// WAL-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalErrorCode {
    /// Writing record bytes failed
    AppendFailed,
    /// The durability barrier failed
    FsyncFailed,
    /// A failed record could not be cut back off the log tail
    RewindFailed,
    /// A record on disk failed validation
    Corruption,
    /// A batch would not fit the record length field
    RecordTooLarge,
}

impl WalErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            WalErrorCode::AppendFailed => "WAL_APPEND_FAILED",
            WalErrorCode::FsyncFailed => "WAL_FSYNC_FAILED",
            WalErrorCode::RewindFailed => "WAL_REWIND_FAILED",
            WalErrorCode::Corruption => "WAL_CORRUPTION",
            WalErrorCode::RecordTooLarge => "WAL_RECORD_TOO_LARGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            WalErrorCode::AppendFailed => Severity::Error,
            WalErrorCode::FsyncFailed => Severity::Error,
            WalErrorCode::RewindFailed => Severity::Fatal,
            WalErrorCode::Corruption => Severity::Fatal,
            WalErrorCode::RecordTooLarge => Severity::Error,
        }
    }
}

impl fmt::Display for WalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// WAL error with code, message and optional context
#[derive(Debug)]
pub struct WalError {
    code: WalErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl WalError {
    /// Create a new append failed error
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new fsync failed error
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::FsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a rewind failed error, keeping the error that caused the rewind
    /// in the details.
    pub fn rewind_failed(cause: &WalError, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::RewindFailed,
            message: "failed to truncate partial record from log tail".to_string(),
            details: Some(format!("cause: {}", cause)),
            source: Some(source),
        }
    }

    /// Create a record-too-large error; nothing was appended
    pub fn record_too_large(len: u64, max: u64) -> Self {
        Self {
            code: WalErrorCode::RecordTooLarge,
            message: format!("record of {} bytes exceeds the {} byte limit", len, max),
            details: None,
            source: None,
        }
    }

    /// Create a new corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error with LSN context
    pub fn corruption_at_lsn(lsn: u64, reason: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("lsn: {}", lsn)),
            source: None,
        }
    }

    /// Create a corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn code(&self) -> WalErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Whether the engine must fault instead of failing just the batch
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for WalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for WAL operations
pub type WalResult<T> = Result<T, WalError>;

/// Why a submission was not accepted into the intake queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The engine has begun (or finished) its close sequence
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Only returned by `try_submit`; `submit` waits instead
    #[error("intake queue is full")]
    QueueFull,

    /// The write alone would not fit in a log record
    #[error("write needs a {0} byte record, above the log record limit")]
    TooLarge(u64),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::ShuttingDown => "SHUTTING_DOWN",
            SubmitError::QueueFull => "QUEUE_FULL",
            SubmitError::TooLarge(_) => "TOO_LARGE",
        }
    }
}

/// Engine lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Opening the log or validating configuration failed
    #[error("failed to open engine: {0}")]
    Open(#[source] WalError),

    /// The writer loop stopped on the fault policy
    #[error("engine faulted: {0}")]
    Faulted(#[source] WalError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The writer thread could not be started or ended abnormally
    #[error("writer thread failure: {0}")]
    Worker(String),
}

/// Result type for engine lifecycle operations
pub type EngineResult<T> = Result<T, EngineError>;
