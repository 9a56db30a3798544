//! Group commit cycle
//!
//! One cycle is: drain the intake queue, validate the batch against the
//! version table, resolve rejections, write the accepted operations as one
//! fsync'd record, and resolve the accepted requests. The writer loop runs
//! cycles back to back on a timer; nothing else touches the version table
//! or the log, so cycle N's record is durable before cycle N+1 drains.
//!
//! An empty drain is a no-op: no LSN, no I/O.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::completion::Outcome;
use super::errors::{WalError, WalErrorCode};
use super::intake::IntakeReceiver;
use super::metrics::{EngineMetrics, MetricsSnapshot};
use super::notifier::CommitNotifier;
use super::sink::LogSink;
use super::validator::validate;
use super::versions::VersionTable;
use super::writer::LogWriter;

/// What a single cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing was queued
    Idle,
    /// Every request in the batch was rejected; nothing was written
    AllRejected { rejected: usize },
    /// One record became durable
    Committed {
        lsn: u64,
        accepted: usize,
        rejected: usize,
    },
    /// The record could not be made durable; accepted requests got `IoFailure`
    Failed {
        accepted: usize,
        rejected: usize,
        error: WalError,
    },
    /// The fault policy tripped; the intake is closed and drained
    Faulted(WalError),
}

impl CycleOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleOutcome::Idle)
    }

    pub fn lsn(&self) -> Option<u64> {
        match self {
            CycleOutcome::Committed { lsn, .. } => Some(*lsn),
            _ => None,
        }
    }
}

/// Owns everything the single writer mutates: intake receiver, version
/// table and log writer.
pub struct GroupCommitter<S: LogSink> {
    intake: IntakeReceiver,
    versions: VersionTable,
    writer: LogWriter<S>,
    notifier: CommitNotifier,
    metrics: Arc<EngineMetrics>,
    /// Consecutive failed batches before faulting; 0 never faults
    fault_after: u32,
    consecutive_failures: u32,
}

impl<S: LogSink> GroupCommitter<S> {
    pub fn new(
        intake: IntakeReceiver,
        versions: VersionTable,
        writer: LogWriter<S>,
        metrics: Arc<EngineMetrics>,
        fault_after: u32,
    ) -> Self {
        Self {
            intake,
            versions,
            writer,
            notifier: CommitNotifier::new(Arc::clone(&metrics)),
            metrics,
            fault_after,
            consecutive_failures: 0,
        }
    }

    pub fn versions(&self) -> &VersionTable {
        &self.versions
    }

    pub fn last_lsn(&self) -> u64 {
        self.writer.last_lsn()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether every submitter is gone and nothing is left to drain.
    pub fn intake_disconnected(&self) -> bool {
        self.intake.is_disconnected()
    }

    /// Run one collect → validate → write → notify cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let batch = self.intake.drain_available();
        self.metrics.record_cycle(batch.is_empty());
        if batch.is_empty() {
            return CycleOutcome::Idle;
        }

        let batch_size = batch.len();
        let mut validation = validate(batch, &mut self.versions);
        let accepted = validation.accepted_count();
        let rejected = validation.rejected_count();

        self.notifier.reject(std::mem::take(&mut validation.rejected));

        if accepted == 0 {
            debug!(batch_size, "batch fully rejected; nothing to write");
            return CycleOutcome::AllRejected { rejected };
        }

        let operations = std::mem::take(&mut validation.operations);
        let pending = std::mem::take(&mut validation.pending);

        match self.writer.write_batch(operations) {
            Ok(written) => {
                self.consecutive_failures = 0;
                self.metrics.record_commit(accepted, written.bytes);
                self.notifier.commit(written.lsn, pending);
                debug!(
                    lsn = written.lsn,
                    accepted,
                    rejected,
                    bytes = written.bytes,
                    "batch committed"
                );
                CycleOutcome::Committed {
                    lsn: written.lsn,
                    accepted,
                    rejected,
                }
            }
            Err(err) => {
                validation.rollback(&mut self.versions);
                self.metrics.record_failure(accepted);
                self.notifier.fail(pending);
                // An oversized batch says nothing about the device.
                if err.code() != WalErrorCode::RecordTooLarge {
                    self.consecutive_failures += 1;
                }
                warn!(
                    accepted,
                    rejected,
                    consecutive_failures = self.consecutive_failures,
                    error = %err,
                    "batch failed; accepted requests resolved as io failure"
                );

                if err.is_fatal()
                    || (self.fault_after > 0 && self.consecutive_failures >= self.fault_after)
                {
                    self.fault();
                    return CycleOutcome::Faulted(err);
                }
                CycleOutcome::Failed {
                    accepted,
                    rejected,
                    error: err,
                }
            }
        }
    }

    /// Close the intake, then run the last cycle over whatever is queued.
    pub fn drain_final(&mut self) -> CycleOutcome {
        self.intake.close();
        self.run_cycle()
    }

    /// Stop taking work: close the intake and fail everything still queued
    /// without attempting to write it.
    fn fault(&mut self) {
        self.intake.close();
        let stranded = self.intake.drain_available();
        if !stranded.is_empty() {
            self.metrics.record_aborted(stranded.len());
            self.notifier.abort(stranded, Outcome::IoFailure);
        }
        error!(
            consecutive_failures = self.consecutive_failures,
            last_lsn = self.writer.last_lsn(),
            "write path faulted; intake closed"
        );
    }

    /// Release the log and hand back the final version table.
    pub fn finish(self) -> (VersionTable, u64) {
        let last_lsn = self.writer.last_lsn();
        info!(last_lsn, keys = self.versions.len(), "log released");
        (self.versions, last_lsn)
    }
}
