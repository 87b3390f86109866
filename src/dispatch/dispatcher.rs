//! Public dispatcher entry point
//!
//! Producers call [`Dispatcher::submit`] and get a [`ReplyHandle`] back
//! straight away; the result is collected later with
//! [`Dispatcher::wait`] or directly on the handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::gate::AdmissionGate;
use super::intake::{intake, IntakeSender, TryEnqueueError};
use super::pool::{spawn_pool, PoolShared};
use super::stats::{DispatcherState, DispatcherStats, StatsRecorder};
use super::task::{ReplyHandle, Task, TaskId, Work};

// ─────────────────────────────────────────────────────────────────
// Dispatcher Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for a dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Executor loops pulling from the intake (0 = gate-only mode)
    pub workers: usize,

    /// Maximum task bodies running at once
    pub capacity: usize,

    /// Intake bound (None = unbounded)
    pub queue_bound: Option<usize>,

    /// Default producer-side wait limit used by [`Dispatcher::wait`]
    pub await_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 4,
            queue_bound: Some(100),
            await_timeout: None,
        }
    }
}

impl DispatcherConfig {
    pub fn new(workers: usize, capacity: usize, queue_bound: Option<usize>) -> Self {
        Self {
            workers,
            capacity,
            queue_bound,
            await_timeout: None,
        }
    }

    /// Set the default wait limit
    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::config_field_invalid(
                "dispatcher.capacity",
                "capacity must be at least 1",
            ));
        }
        if self.queue_bound == Some(0) {
            return Err(Error::config_field_invalid(
                "dispatcher.queue_bound",
                "queue bound must be at least 1 (omit it for an unbounded intake)",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────

/// Bounded concurrent dispatcher for one kind of [`Work`].
///
/// Must be created inside a tokio runtime. Share it between producers
/// with an `Arc`.
pub struct Dispatcher<W: Work> {
    config: DispatcherConfig,
    sender: Mutex<Option<IntakeSender<W>>>,
    shared: Arc<PoolShared<W>>,
    state_rx: watch::Receiver<DispatcherState>,
    next_id: AtomicU64,
}

impl<W: Work> Dispatcher<W> {
    /// Create a dispatcher and start its executors
    pub fn new(workers: usize, capacity: usize, queue_bound: Option<usize>) -> Result<Self> {
        Self::with_config(DispatcherConfig::new(workers, capacity, queue_bound))
    }

    /// Create a dispatcher from a full configuration
    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Internal(format!("Dispatcher needs a running tokio runtime: {}", e))
        })?;

        let gate = AdmissionGate::new(config.capacity)?;
        let (sender, receiver) = intake(config.queue_bound);
        let (state_tx, state_rx) = watch::channel(DispatcherState::Open);

        let shared = Arc::new(PoolShared {
            intake: receiver,
            gate,
            stats: Arc::new(StatsRecorder::default()),
            state: Arc::new(state_tx),
            live_loops: AtomicUsize::new(0),
        });

        // Loop handles are not kept: loops end on their own once the
        // intake closes and report through the state channel.
        let _ = spawn_pool(Arc::clone(&shared), config.workers);

        info!(
            workers = config.workers,
            capacity = config.capacity,
            queue_bound = ?config.queue_bound,
            mode = if config.workers == 0 { "gate-only" } else { "fixed-pool" },
            "Dispatcher started"
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            shared,
            state_rx,
            next_id: AtomicU64::new(1),
        })
    }

    /// Configuration this dispatcher was built with
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn open_sender(&self) -> Result<IntakeSender<W>> {
        match self.sender.lock().as_ref() {
            Some(sender) => Ok(sender.clone()),
            None => Err(self.reject_closed()),
        }
    }

    fn reject_closed(&self) -> Error {
        self.shared.stats.record_rejected();
        Error::Closed
    }

    fn next_id(&self) -> TaskId {
        TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Resolve once the state has left `Open`
    async fn shutdown_signaled(mut state: watch::Receiver<DispatcherState>) {
        let _ = state.wait_for(|s| *s != DispatcherState::Open).await;
    }

    /// Queue work and return the handle its result will arrive on.
    ///
    /// Waits only while a bounded intake is full. Fails with
    /// [`Error::Closed`] once shutdown has been signaled, including for a
    /// producer that was still waiting for room at that moment.
    pub async fn submit(&self, payload: W) -> Result<ReplyHandle<W::Output>> {
        let sender = self.open_sender()?;

        let slot = tokio::select! {
            biased;
            _ = Self::shutdown_signaled(self.state_rx.clone()) => None,
            slot = sender.reserve() => slot,
        };
        let Some(slot) = slot else {
            return Err(self.reject_closed());
        };

        // Filling under the sender lock orders this enqueue against
        // `shutdown`, which takes the sender under the same lock.
        let handle = {
            let open = self.sender.lock();
            if open.is_none() {
                return Err(self.reject_closed());
            }
            let (task, handle) = Task::new(self.next_id(), payload);
            if slot.fill(task).is_err() {
                return Err(self.reject_closed());
            }
            self.shared.stats.record_submitted();
            handle
        };

        debug!(task_id = %handle.id(), "Task queued");
        Ok(handle)
    }

    /// Queue work without waiting for room.
    ///
    /// Fails with [`Error::QueueFull`] when a bounded intake is at its
    /// limit, and with [`Error::Closed`] after shutdown.
    pub fn try_submit(&self, payload: W) -> Result<ReplyHandle<W::Output>> {
        let open = self.sender.lock();
        let Some(sender) = open.as_ref() else {
            return Err(self.reject_closed());
        };
        let (task, handle) = Task::new(self.next_id(), payload);

        match sender.try_send(task) {
            Ok(()) => {
                self.shared.stats.record_submitted();
                debug!(task_id = %handle.id(), "Task queued");
                Ok(handle)
            }
            Err(TryEnqueueError::Full) => {
                self.shared.stats.record_rejected();
                Err(Error::QueueFull {
                    bound: self.config.queue_bound.unwrap_or_default(),
                })
            }
            Err(TryEnqueueError::Closed) => Err(self.reject_closed()),
        }
    }

    /// Wait for a submitted task's outcome.
    ///
    /// Honors the configured `await_timeout`; a timeout only affects the
    /// caller, the task still runs to completion.
    pub async fn wait(&self, mut handle: ReplyHandle<W::Output>) -> Result<W::Output> {
        match self.config.await_timeout {
            Some(timeout) => handle.wait_timeout(timeout).await,
            None => handle.wait().await,
        }
    }

    /// Submit and wait in one call
    pub async fn call(&self, payload: W) -> Result<W::Output> {
        let handle = self.submit(payload).await?;
        self.wait(handle).await
    }

    /// Stop accepting work.
    ///
    /// With `drain`, also waits until every queued and in-flight task has
    /// delivered its result and all executors have exited. Calling it
    /// again has no further effect.
    pub async fn shutdown(&self, drain: bool) {
        let sender = self.sender.lock().take();
        if let Some(sender) = sender {
            self.shared.state.send_if_modified(|state| {
                if *state == DispatcherState::Open {
                    *state = DispatcherState::Draining;
                    true
                } else {
                    false
                }
            });
            // Dropping the last dispatcher-held sender closes the intake;
            // executors keep draining what is already queued.
            drop(sender);
            info!(drain, queued = self.stats().queued(), "Dispatcher shutdown signaled");
        }

        if drain {
            self.closed().await;
        }
    }

    /// Resolve once the dispatcher reaches [`DispatcherState::Closed`]
    pub async fn closed(&self) {
        let mut rx = self.state_rx.clone();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = rx.wait_for(|state| *state == DispatcherState::Closed).await;
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    /// Whether new submissions are accepted
    pub fn is_open(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Snapshot of counters and gate usage
    pub fn stats(&self) -> DispatcherStats {
        let recorder = &self.shared.stats;
        DispatcherStats {
            state: self.state(),
            workers: self.config.workers,
            capacity: self.shared.gate.capacity(),
            submitted: recorder.submitted(),
            completed: recorder.completed(),
            failed: recorder.failed(),
            rejected: recorder.rejected(),
            abandoned: recorder.abandoned(),
            in_flight: self.shared.gate.in_use(),
            peak_in_flight: self.shared.gate.peak_in_use(),
        }
    }
}

impl<W: Work> std::fmt::Debug for Dispatcher<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("gate", &self.shared.gate)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::task::Closure;

    #[test]
    fn test_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.capacity, 4);
        assert_eq!(config.queue_bound, Some(100));
        assert!(config.await_timeout.is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(DispatcherConfig::new(2, 0, None).validate().is_err());
        assert!(DispatcherConfig::new(2, 1, Some(0)).validate().is_err());
        assert!(DispatcherConfig::new(0, 1, None).validate().is_ok());
    }

    #[test]
    fn test_creation_outside_runtime_fails() {
        let err = Dispatcher::<Closure<u32>>::new(1, 1, None).unwrap_err();
        match err {
            Error::Internal(message) => assert!(message.contains("tokio runtime")),
            other => panic!("expected Internal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_creation() {
        let dispatcher = Dispatcher::<Closure<u32>>::new(2, 2, Some(8)).unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Open);
        assert!(dispatcher.is_open());

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let dispatcher = Dispatcher::new(2, 2, None).unwrap();
        let handle = dispatcher
            .submit(Closure::new(|| async { Ok(21u32 * 2) }))
            .await
            .unwrap();
        assert_eq!(dispatcher.wait(handle).await.unwrap(), 42);

        let value = dispatcher
            .call(Closure::new(|| async { Ok(5u32) }))
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(dispatcher.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_task_ids_increase() {
        let dispatcher = Dispatcher::new(1, 1, None).unwrap();
        let a = dispatcher.submit(Closure::new(|| async { Ok(()) })).await.unwrap();
        let b = dispatcher.submit(Closure::new(|| async { Ok(()) })).await.unwrap();
        assert!(a.id() < b.id());
    }

    #[tokio::test]
    async fn test_shutdown_state_machine() {
        let dispatcher = Dispatcher::<Closure<()>>::new(2, 1, None).unwrap();
        dispatcher.shutdown(true).await;
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
        assert!(!dispatcher.is_open());

        // Second call is a no-op
        dispatcher.shutdown(true).await;
        assert_eq!(dispatcher.state(), DispatcherState::Closed);

        let err = dispatcher
            .submit(Closure::new(|| async { Ok(()) }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Closed));
        assert_eq!(dispatcher.stats().rejected, 1);
        assert_eq!(dispatcher.stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_configured_await_timeout() {
        let config = DispatcherConfig::new(1, 1, None).with_await_timeout(Duration::from_millis(20));
        let dispatcher = Dispatcher::with_config(config).unwrap();

        let handle = dispatcher
            .submit(Closure::new(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1u8)
            }))
            .await
            .unwrap();
        let task_id = handle.id();

        match dispatcher.wait(handle).await {
            Err(Error::AwaitTimeout { task_id: id, timeout_ms }) => {
                assert_eq!(id, task_id);
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected AwaitTimeout, got {:?}", other),
        }

        // The abandoned task still runs to completion
        dispatcher.shutdown(true).await;
        let stats = dispatcher.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.abandoned, 1);
    }

    #[tokio::test]
    async fn test_try_submit_queue_full() {
        let dispatcher = Dispatcher::new(1, 1, Some(1)).unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only executor
        let blocker = dispatcher
            .submit(Closure::new(move || async move {
                let _ = release_rx.await;
                Ok(0u32)
            }))
            .await
            .unwrap();
        while dispatcher.stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        // Fill the single intake slot, then overflow it
        let queued = dispatcher.try_submit(Closure::new(|| async { Ok(1u32) })).unwrap();
        let err = dispatcher
            .try_submit(Closure::new(|| async { Ok(2u32) }))
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull { bound: 1 }));

        release_tx.send(()).unwrap();
        assert_eq!(blocker.wait().await.unwrap(), 0);
        assert_eq!(queued.wait().await.unwrap(), 1);
        assert_eq!(dispatcher.stats().rejected, 1);
    }
}
