//! Engine lifecycle: `Open → Draining → Closed`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Externally visible engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EngineState {
    /// Accepting submissions and running cycles
    Open = 0,
    /// Shutdown requested; one final cycle drains what is queued
    Draining = 1,
    /// Terminal; the log handle has been released
    Closed = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Open,
            1 => EngineState::Draining,
            _ => EngineState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Open => "OPEN",
            EngineState::Draining => "DRAINING",
            EngineState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared, lock-free holder of the current [`EngineState`].
///
/// Transitions only move forward.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Open as u8),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn accepts_submissions(&self) -> bool {
        self.state() == EngineState::Open
    }

    /// `Open → Draining`. Returns false if the engine had already left `Open`.
    pub fn begin_draining(&self) -> bool {
        self.state
            .compare_exchange(
                EngineState::Open as u8,
                EngineState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn mark_closed(&self) {
        self.state.store(EngineState::Closed as u8, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_open() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), EngineState::Open);
        assert!(lifecycle.accepts_submissions());
    }

    #[test]
    fn test_draining_only_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_draining());
        assert!(!lifecycle.begin_draining());
        assert_eq!(lifecycle.state(), EngineState::Draining);
        assert!(!lifecycle.accepts_submissions());
    }

    #[test]
    fn test_closed_never_reopens() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_closed();
        assert!(!lifecycle.begin_draining());
        assert_eq!(lifecycle.state(), EngineState::Closed);
    }
}
