//! Dispatcher state and counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────
// Dispatcher State
// ─────────────────────────────────────────────────────────────────

/// Lifecycle of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    /// Accepting submissions
    Open,
    /// Shutdown signaled; queued and in-flight tasks are finishing
    Draining,
    /// Intake drained and every executor has exited
    Closed,
}

impl Default for DispatcherState {
    fn default() -> Self {
        DispatcherState::Open
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Open => write!(f, "open"),
            DispatcherState::Draining => write!(f, "draining"),
            DispatcherState::Closed => write!(f, "closed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────

/// Lifetime counters updated by producers and executors
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A reply was written after its producer stopped listening
    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────

/// Point-in-time view of a dispatcher.
///
/// Counters are read independently, so under load the fields may be off
/// by the few tasks that changed state while the snapshot was taken.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub state: DispatcherState,
    pub workers: usize,
    pub capacity: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub abandoned: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl DispatcherStats {
    /// Tasks accepted but not yet finished or executing.
    ///
    /// A task is counted as finished as soon as its outcome is known but
    /// keeps its gate slot until the reply is delivered, so for that short
    /// window it appears in both `in_flight` and `completed`/`failed`.
    /// The estimate can then read up to `in_flight` too low; it never goes
    /// below zero.
    pub fn queued(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.failed + self.in_flight as u64)
    }

    /// Tasks that reached a terminal outcome
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(DispatcherState::default(), DispatcherState::Open);
        assert_eq!(DispatcherState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_string(&DispatcherState::Closed).unwrap(),
            "\"closed\""
        );
    }

    #[test]
    fn test_recorder_counts() {
        let recorder = StatsRecorder::default();
        recorder.record_submitted();
        recorder.record_submitted();
        recorder.record_completed();
        recorder.record_failed();
        recorder.record_rejected();

        assert_eq!(recorder.submitted(), 2);
        assert_eq!(recorder.completed(), 1);
        assert_eq!(recorder.failed(), 1);
        assert_eq!(recorder.rejected(), 1);
        assert_eq!(recorder.abandoned(), 0);
    }

    #[test]
    fn test_snapshot_queued() {
        let stats = DispatcherStats {
            state: DispatcherState::Open,
            workers: 2,
            capacity: 2,
            submitted: 10,
            completed: 3,
            failed: 1,
            rejected: 0,
            abandoned: 0,
            in_flight: 2,
            peak_in_flight: 2,
        };
        assert_eq!(stats.queued(), 4);
        assert_eq!(stats.finished(), 4);
    }

    #[test]
    fn test_queued_with_finishing_tasks() {
        // Both tasks finished but still hold their slots
        let stats = DispatcherStats {
            state: DispatcherState::Draining,
            workers: 2,
            capacity: 2,
            submitted: 2,
            completed: 1,
            failed: 1,
            rejected: 0,
            abandoned: 0,
            in_flight: 2,
            peak_in_flight: 2,
        };
        assert_eq!(stats.queued(), 0);
        assert_eq!(stats.finished(), 2);
    }
}
