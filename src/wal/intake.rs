//! Bounded intake queue between producers and the writer loop.
//!
//! Many producers submit through cloned [`Submitter`]s; the single writer
//! loop owns the [`IntakeReceiver`]. A full queue suspends producers rather
//! than growing memory.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::completion::{CommitTicket, Completion};
use super::errors::SubmitError;
use super::lifecycle::Lifecycle;
use super::record::{fits_length_field, single_op_record_len};

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// A single-key write guarded by an expected version.
#[derive(Debug)]
pub struct WriteRequest {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Version the producer expects the key to hold right now
    pub base_version: u64,
    completion: Completion,
}

impl WriteRequest {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> (Self, CommitTicket) {
        let (completion, ticket) = Completion::new();
        let request = Self {
            key: key.into(),
            value: value.into(),
            base_version,
            completion,
        };
        (request, ticket)
    }

    /// Split into payload and result slot.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>, u64, Completion) {
        (self.key, self.value, self.base_version, self.completion)
    }

    pub fn completion(self) -> Completion {
        self.completion
    }
}

/// Create a queue of `capacity` slots tied to `lifecycle`.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn intake_queue(capacity: usize, lifecycle: Arc<Lifecycle>) -> (Submitter, IntakeReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        Submitter { tx, lifecycle },
        IntakeReceiver {
            rx,
            disconnected: false,
        },
    )
}

/// A write whose own record would not fit the length field is refused up
/// front; batching can only make the record larger.
fn check_write_len(key_len: usize, value_len: usize) -> Result<(), SubmitError> {
    let len = single_op_record_len(key_len, value_len);
    if fits_length_field(len) {
        Ok(())
    } else {
        Err(SubmitError::TooLarge(len))
    }
}

/// Producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::Sender<WriteRequest>,
    lifecycle: Arc<Lifecycle>,
}

impl Submitter {
    /// Enqueue a write, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// `SubmitError::ShuttingDown` once the engine has left `Open`,
    /// `TooLarge` if the write could never fit in one log record.
    pub async fn submit(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> Result<CommitTicket, SubmitError> {
        let (request, ticket) = self.prepare(key, value, base_version)?;
        self.tx
            .send(request)
            .await
            .map_err(|_| SubmitError::ShuttingDown)?;
        Ok(ticket)
    }

    /// Blocking variant of [`submit`](Self::submit) for synchronous producers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous runtime.
    pub fn blocking_submit(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> Result<CommitTicket, SubmitError> {
        let (request, ticket) = self.prepare(key, value, base_version)?;
        self.tx
            .blocking_send(request)
            .map_err(|_| SubmitError::ShuttingDown)?;
        Ok(ticket)
    }

    /// Enqueue without waiting for space.
    ///
    /// # Errors
    ///
    /// `QueueFull` if every slot is taken, `ShuttingDown` once closing,
    /// `TooLarge` for an oversized write.
    pub fn try_submit(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> Result<CommitTicket, SubmitError> {
        let (request, ticket) = self.prepare(key, value, base_version)?;
        match self.tx.try_send(request) {
            Ok(()) => Ok(ticket),
            Err(TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    fn prepare(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        base_version: u64,
    ) -> Result<(WriteRequest, CommitTicket), SubmitError> {
        if !self.lifecycle.accepts_submissions() {
            return Err(SubmitError::ShuttingDown);
        }
        let (key, value) = (key.into(), value.into());
        check_write_len(key.len(), value.len())?;
        Ok(WriteRequest::new(key, value, base_version))
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Requests currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Writer-loop side of the queue.
#[derive(Debug)]
pub struct IntakeReceiver {
    rx: mpsc::Receiver<WriteRequest>,
    disconnected: bool,
}

impl IntakeReceiver {
    /// Take everything queued right now, in enqueue order. Never waits.
    pub fn drain_available(&mut self) -> Vec<WriteRequest> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(request) => batch.push(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        batch
    }

    /// Refuse further sends. Requests already queued stay drainable.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// True once every submitter is gone and the queue has been emptied.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}
