//! Log writer: one record per committed batch, fsync before return.
//!
//! A batch is durable only once `sync` has returned. On any append or
//! fsync failure the partially written tail is cut off and the LSN is
//! handed back, so a failed batch leaves neither bytes nor an LSN gap
//! behind.
//!
//! Two counters: `next_lsn` is private to the writer and allocates; the
//! shared `durable_lsn` is only stored after a successful fsync, so readers
//! never see an LSN that is not on disk and never see it go backwards.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use super::errors::{WalError, WalResult};
use super::reader::last_lsn_in;
use super::record::{fits_length_field, LogOperation, LogRecord, MAX_RECORD_SIZE};
use super::sink::{FileSink, LogSink};

/// Summary of a durably written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenRecord {
    pub lsn: u64,
    pub operations: usize,
    pub bytes: usize,
}

/// Serializes accepted operations and appends them durably.
pub struct LogWriter<S: LogSink> {
    sink: S,
    /// LSN the next record will take
    next_lsn: u64,
    /// Highest fsync'd LSN; shared read-only with engine handles.
    durable_lsn: Arc<AtomicU64>,
}

impl LogWriter<FileSink> {
    /// Opens the log at `path`, resuming after its last record.
    pub fn open(path: &Path) -> WalResult<Self> {
        let last_lsn = last_lsn_in(path)?;
        let sink = FileSink::open(path)?;
        Ok(Self::with_sink(sink, last_lsn))
    }
}

impl<S: LogSink> LogWriter<S> {
    /// Wraps an arbitrary sink whose last committed LSN is `last_lsn`.
    pub fn with_sink(sink: S, last_lsn: u64) -> Self {
        Self {
            sink,
            next_lsn: last_lsn + 1,
            durable_lsn: Arc::new(AtomicU64::new(last_lsn)),
        }
    }

    /// Last LSN made durable by this writer (or found on open).
    pub fn last_lsn(&self) -> u64 {
        self.durable_lsn.load(Ordering::Acquire)
    }

    /// Shared view of the durable LSN. Only ever moves forward.
    pub fn lsn_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.durable_lsn)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Writes `operations` as one record and fsyncs.
    ///
    /// The LSN is taken from the counter exactly once, immediately before
    /// serialization, and is shared by every operation in the record.
    ///
    /// # Errors
    ///
    /// - `WAL_RECORD_TOO_LARGE` if the record would overflow its length
    ///   field; nothing is written and no LSN is taken
    /// - `WAL_APPEND_FAILED` / `WAL_FSYNC_FAILED` if the record could not be
    ///   made durable; the log and counter are back at their previous state
    /// - `WAL_REWIND_FAILED` (fatal) if the failed tail could not be removed
    pub fn write_batch(&mut self, operations: Vec<LogOperation>) -> WalResult<WrittenRecord> {
        debug_assert!(!operations.is_empty(), "empty batches are never written");

        let mut record = LogRecord::new(0, operations);
        check_record_len(record.encoded_len() as u64)?;

        let lsn = self.next_lsn;
        self.next_lsn += 1;
        record.lsn = lsn;
        let bytes = record.serialize();
        let rewind_to = self.sink.len();

        match self.append_and_sync(lsn, &bytes) {
            Ok(()) => {
                self.durable_lsn.store(lsn, Ordering::Release);
                debug!(lsn, bytes = bytes.len(), "log record durable");
                Ok(WrittenRecord {
                    lsn,
                    operations: record.operations.len(),
                    bytes: bytes.len(),
                })
            }
            Err(cause) => {
                self.next_lsn = lsn;
                if let Err(e) = self.sink.truncate(rewind_to) {
                    error!(lsn, offset = rewind_to, error = %e, "failed to rewind log tail");
                    return Err(WalError::rewind_failed(&cause, e));
                }
                Err(cause)
            }
        }
    }

    fn append_and_sync(&mut self, lsn: u64, bytes: &[u8]) -> WalResult<()> {
        self.sink.append(bytes).map_err(|e| {
            WalError::append_failed(format!("Failed to append log record at lsn {}", lsn), e)
        })?;
        self.sink.sync().map_err(|e| {
            WalError::fsync_failed(format!("fsync failed after log append at lsn {}", lsn), e)
        })
    }
}

/// Rejects a record whose size the u32 length field cannot hold.
pub fn check_record_len(len: u64) -> WalResult<()> {
    if fits_length_field(len) {
        Ok(())
    } else {
        Err(WalError::record_too_large(len, MAX_RECORD_SIZE))
    }
}
