//! WAL engine: lifecycle and the dedicated writer thread.
//!
//! The engine owns one writer thread running a current-thread tokio
//! runtime. That thread is the only place the version table and the log
//! are touched; producers talk to it through the bounded intake queue and
//! hear back through their commit tickets.
//!
//! ```text
//!   submit ──► intake ──► [tick] drain ─► validate ─► write+fsync ─► notify
//!                                    ▲                                  │
//!                                    └────────── next cycle ◄───────────┘
//! ```
//!
//! Shutdown is cooperative. `shutdown()` flips the lifecycle to Draining so
//! new submissions fail, then signals the loop; the cycle in flight
//! finishes, one final cycle drains what is queued, the log is released,
//! and the state becomes Closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

use super::completion::CommitTicket;
use super::config::EngineConfig;
use super::errors::{EngineError, EngineResult, SubmitError, WalError};
use super::group_commit::{CycleOutcome, GroupCommitter};
use super::intake::{intake_queue, Submitter};
use super::lifecycle::{EngineState, Lifecycle};
use super::metrics::{EngineMetrics, MetricsSnapshot};
use super::sink::LogSink;
use super::versions::VersionTable;
use super::writer::LogWriter;

const WRITER_THREAD_NAME: &str = "groupwal-writer";

/// Final state handed back by [`WalEngine::close`].
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub last_lsn: u64,
    pub versions: VersionTable,
    pub metrics: MetricsSnapshot,
}

/// Handle to a running group-commit engine.
pub struct WalEngine {
    submitter: Submitter,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<EngineMetrics>,
    last_lsn: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    report_rx: Option<oneshot::Receiver<EngineResult<EngineReport>>>,
    thread: Option<JoinHandle<()>>,
}

impl WalEngine {
    /// Open the log at `config.log_path` with an empty version table.
    pub fn open(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let writer = LogWriter::open(&config.log_path).map_err(EngineError::Open)?;
        Self::open_with(config, writer, VersionTable::new())
    }

    /// Start an engine over an already-opened writer and a seeded version
    /// table.
    pub fn open_with<S: LogSink>(
        config: &EngineConfig,
        writer: LogWriter<S>,
        versions: VersionTable,
    ) -> EngineResult<Self> {
        config.validate()?;

        let lifecycle = Arc::new(Lifecycle::new());
        let metrics = Arc::new(EngineMetrics::new());
        let last_lsn = writer.lsn_counter();
        let (submitter, receiver) = intake_queue(config.queue_capacity, Arc::clone(&lifecycle));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (report_tx, report_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();

        let resumed_at = writer.last_lsn();
        let keys = versions.len();
        let committer = GroupCommitter::new(
            receiver,
            versions,
            writer,
            Arc::clone(&metrics),
            config.fault_after_io_failures,
        );
        let interval = config.collect_interval();
        let loop_lifecycle = Arc::clone(&lifecycle);

        let thread = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to build writer runtime: {}", e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let result =
                    runtime.block_on(run_writer(committer, interval, shutdown_rx, loop_lifecycle));
                let _ = report_tx.send(result);
            })
            .map_err(|e| EngineError::Worker(format!("failed to spawn writer thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => return Err(EngineError::Worker(msg)),
            Err(_) => {
                return Err(EngineError::Worker(
                    "writer thread exited during startup".into(),
                ))
            }
        }

        info!(
            last_lsn = resumed_at,
            keys,
            queue_capacity = config.queue_capacity,
            collect_interval_micros = config.collect_interval_micros,
            "engine open"
        );

        Ok(Self {
            submitter,
            lifecycle,
            metrics,
            last_lsn,
            shutdown_tx,
            report_rx: Some(report_rx),
            thread: Some(thread),
        })
    }

    /// A producer handle that can outlive borrows of the engine.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Enqueue a write, suspending while the intake queue is full.
    pub async fn submit(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> Result<CommitTicket, SubmitError> {
        self.submitter.submit(key, value, base_version).await
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Highest LSN made durable so far.
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Begin the close sequence without waiting for it. Idempotent.
    pub fn shutdown(&self) {
        if self.lifecycle.begin_draining() {
            info!(last_lsn = self.last_lsn(), "engine draining");
        }
        self.shutdown_tx.send_replace(true);
    }

    /// Shut down, wait for the final cycle, and return the final state.
    /// The writer thread has exited by the time this returns.
    ///
    /// # Errors
    ///
    /// `EngineError::Faulted` if the write path faulted before or during
    /// the close sequence.
    pub async fn close(mut self) -> EngineResult<EngineReport> {
        self.shutdown();
        let report_rx = self
            .report_rx
            .take()
            .ok_or_else(|| EngineError::Worker("engine already closed".into()))?;
        let result = report_rx.await.unwrap_or_else(|_| {
            Err(EngineError::Worker(
                "writer thread exited without a report".into(),
            ))
        });
        if let Some(thread) = self.thread.take() {
            join_writer(thread).await?;
        }
        result
    }

    /// Blocking variant of [`close`](Self::close) for synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous runtime.
    pub fn close_blocking(mut self) -> EngineResult<EngineReport> {
        self.shutdown();
        let report_rx = self
            .report_rx
            .take()
            .ok_or_else(|| EngineError::Worker("engine already closed".into()))?;
        let result = report_rx.blocking_recv().unwrap_or_else(|_| {
            Err(EngineError::Worker(
                "writer thread exited without a report".into(),
            ))
        });
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(EngineError::Worker("writer thread panicked".into()));
            }
        }
        result
    }
}

impl Drop for WalEngine {
    fn drop(&mut self) {
        self.lifecycle.begin_draining();
        self.shutdown_tx.send_replace(true);
    }
}

/// The writer loop. Runs until shutdown is signaled, every submitter is
/// gone, or the write path faults.
async fn run_writer<S: LogSink>(
    mut committer: GroupCommitter<S>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    lifecycle: Arc<Lifecycle>,
) -> EngineResult<EngineReport> {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        if let CycleOutcome::Faulted(err) = committer.run_cycle() {
            return Err(fault(&lifecycle, err));
        }
        if committer.intake_disconnected() {
            break;
        }
    }

    lifecycle.begin_draining();
    if let CycleOutcome::Faulted(err) = committer.drain_final() {
        return Err(fault(&lifecycle, err));
    }

    let metrics = committer.metrics();
    let (versions, last_lsn) = committer.finish();
    lifecycle.mark_closed();
    info!(last_lsn, keys = versions.len(), "engine closed");

    Ok(EngineReport {
        last_lsn,
        versions,
        metrics,
    })
}

/// Join the writer thread without blocking the caller's runtime.
async fn join_writer(thread: JoinHandle<()>) -> EngineResult<()> {
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .map_err(|e| EngineError::Worker(format!("failed to join writer thread: {}", e)))?
        .map_err(|_| EngineError::Worker("writer thread panicked".into()))
}

fn fault(lifecycle: &Lifecycle, err: WalError) -> EngineError {
    lifecycle.begin_draining();
    lifecycle.mark_closed();
    error!(code = err.code().code(), error = %err, "engine faulted");
    EngineError::Faulted(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::completion::Outcome;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> EngineConfig {
        EngineConfig::new(temp_dir.path().join("wal.log"))
    }

    #[tokio::test]
    async fn test_open_submit_close() {
        let temp_dir = TempDir::new().unwrap();
        let engine = WalEngine::open(&config(&temp_dir)).unwrap();
        assert_eq!(engine.state(), EngineState::Open);

        let ticket = engine.submit("a", "1", 0).await.unwrap();
        assert_eq!(ticket.wait().await, Outcome::Committed { lsn: 1, version: 1 });
        assert_eq!(engine.last_lsn(), 1);

        let report = engine.close().await.unwrap();
        assert_eq!(report.last_lsn, 1);
        assert_eq!(report.versions.get(b"a"), 1);
        assert_eq!(report.metrics.requests_committed, 1);
    }

    #[tokio::test]
    async fn test_join_writer_waits_for_exit() {
        let exited = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::Release);
        });

        join_writer(thread).await.unwrap();
        assert!(exited.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_join_writer_reports_panic() {
        let thread = thread::spawn(|| panic!("writer blew up"));
        match join_writer(thread).await {
            Err(EngineError::Worker(msg)) => assert!(msg.contains("panicked")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let temp_dir = TempDir::new().unwrap();
        let engine = WalEngine::open(&config(&temp_dir)).unwrap();
        let submitter = engine.submitter();

        engine.shutdown();
        assert_ne!(engine.state(), EngineState::Open);
        assert_eq!(
            submitter.try_submit("a", "1", 0).unwrap_err(),
            SubmitError::ShuttingDown
        );

        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_resumes_lsn() {
        let temp_dir = TempDir::new().unwrap();

        let engine = WalEngine::open(&config(&temp_dir)).unwrap();
        let t = engine.submit("a", "1", 0).await.unwrap();
        assert_eq!(t.wait().await.lsn(), Some(1));
        engine.close().await.unwrap();

        let engine = WalEngine::open(&config(&temp_dir)).unwrap();
        assert_eq!(engine.last_lsn(), 1);
        let t = engine.submit("b", "1", 0).await.unwrap();
        assert_eq!(t.wait().await.lsn(), Some(2));
        engine.close().await.unwrap();
    }

    #[test]
    fn test_close_blocking() {
        let temp_dir = TempDir::new().unwrap();
        let engine = WalEngine::open(&config(&temp_dir)).unwrap();

        let t = engine.submitter().blocking_submit("a", "1", 0).unwrap();
        assert!(t.blocking_wait().is_committed());

        let report = engine.close_blocking().unwrap();
        assert_eq!(report.last_lsn, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir).with_queue_capacity(0);
        assert!(matches!(WalEngine::open(&config), Err(EngineError::Config(_))));
    }
}
