//! groupwal - group-commit write-ahead log for a key-value store
//!
//! Concurrent single-key writes guarded by optimistic version checks are
//! batched into one fsync'd log record per cycle. See [`wal`] for the
//! engine and [`cli`] for the command-line adapter.

pub mod cli;
pub mod wal;
