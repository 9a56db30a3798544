//! Group-commit write-ahead log
//!
//! Producers submit single-key writes guarded by an expected base version.
//! A single writer thread drains the intake queue on a fixed cadence,
//! validates the batch in enqueue order against the version table, writes
//! every accepted operation as one checksummed record, fsyncs once, and
//! resolves each request with exactly one [`Outcome`].
//!
//! # Guarantees
//!
//! - No `Committed` outcome before the record carrying it is fsync'd
//! - One LSN per durable record, gap-free across records
//! - Per-key versions advance 1, 2, 3, ... in enqueue order
//! - Rejected requests never reach the log
//! - Every accepted submission resolves exactly once
//!
//! # Record format
//!
//! Little-endian, self-delimiting:
//!
//! ```text
//! u32 length | u8 format (0x01) | u64 lsn | u32 op_count
//!   op_count × ( u8 tag (0x01) | u32 key_len | key | u32 value_len | value | u64 version )
//! u32 crc32 over everything before it
//! ```

mod completion;
mod config;
mod engine;
mod errors;
mod group_commit;
mod intake;
mod lifecycle;
mod metrics;
mod notifier;
mod reader;
mod record;
mod sink;
mod validator;
mod versions;
mod writer;

pub use completion::{CommitTicket, Completion, Outcome};
pub use config::EngineConfig;
pub use engine::{EngineReport, WalEngine};
pub use errors::{
    EngineError, EngineResult, Severity, SubmitError, WalError, WalErrorCode, WalResult,
};
pub use group_commit::{CycleOutcome, GroupCommitter};
pub use intake::{intake_queue, IntakeReceiver, Submitter, WriteRequest, DEFAULT_QUEUE_CAPACITY};
pub use lifecycle::{EngineState, Lifecycle};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use reader::{last_lsn_in, LogReader};
pub use record::{compute_checksum, LogOperation, LogRecord};
pub use sink::{FileSink, LogSink};
pub use validator::{validate, PendingCommit, Rejected, Validation};
pub use versions::VersionTable;
pub use writer::{LogWriter, WrittenRecord};
