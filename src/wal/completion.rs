//! Per-request outcome and the one-shot slot that carries it.
//!
//! A [`Completion`] is consumed when resolved, so resolving twice cannot be
//! written. A completion dropped without being resolved reports
//! `ShuttingDown`, so a producer is never left waiting on a request the
//! engine has let go of.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

/// Final result of one write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Durable in the record with this LSN; `version` is the key's new version
    Committed { lsn: u64, version: u64 },
    /// The base version did not match; `current_version` is what it was
    VersionConflict { current_version: u64 },
    /// The batch's record could not be made durable
    IoFailure,
    /// The engine was closing and did not take the request
    ShuttingDown,
}

impl Outcome {
    /// Error code for non-committed outcomes
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Outcome::Committed { .. } => None,
            Outcome::VersionConflict { .. } => Some("VERSION_CONFLICT"),
            Outcome::IoFailure => Some("IO_FAILURE"),
            Outcome::ShuttingDown => Some("SHUTTING_DOWN"),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed { .. })
    }

    pub fn lsn(&self) -> Option<u64> {
        match self {
            Outcome::Committed { lsn, .. } => Some(*lsn),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Committed { lsn, version } => {
                write!(f, "committed at lsn {} (version {})", lsn, version)
            }
            Outcome::VersionConflict { current_version } => {
                write!(f, "version conflict (current version {})", current_version)
            }
            Outcome::IoFailure => write!(f, "io failure"),
            Outcome::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Engine side of a request's result slot.
#[derive(Debug)]
pub struct Completion {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl Completion {
    /// Create a slot and the ticket that observes it.
    pub fn new() -> (Self, CommitTicket) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, CommitTicket { rx })
    }

    /// Deliver `outcome`. Returns false if the producer stopped waiting,
    /// in which case the outcome is discarded.
    pub fn resolve(mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Whether the producer has already given up on this request.
    pub fn is_abandoned(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Outcome::ShuttingDown);
        }
    }
}

/// Producer side of a request's result slot.
#[derive(Debug)]
pub struct CommitTicket {
    rx: oneshot::Receiver<Outcome>,
}

impl CommitTicket {
    /// Wait for the outcome.
    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or(Outcome::ShuttingDown)
    }

    /// Wait at most `timeout`. On timeout the ticket is dropped: the request
    /// still completes inside the engine, but its outcome is discarded.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<Outcome> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(result) => Some(result.unwrap_or(Outcome::ShuttingDown)),
            Err(_) => None,
        }
    }

    /// Wait from synchronous code.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous runtime.
    pub fn blocking_wait(self) -> Outcome {
        self.rx.blocking_recv().unwrap_or(Outcome::ShuttingDown)
    }
}
