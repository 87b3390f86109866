//! Task and reply model
//!
//! A [`Task`] pairs a unit of [`Work`] with the private reply slot of the
//! producer that submitted it. The slot is a `tokio::sync::oneshot`
//! channel: it holds exactly one value, writing never blocks, and the
//! producer's [`ReplyHandle`] is the only reader.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Task Identity
// ─────────────────────────────────────────────────────────────────

/// Correlation token, unique per submission within one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw sequence number (submission order)
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Work Capability
// ─────────────────────────────────────────────────────────────────

/// A unit of work that can be computed once.
///
/// Errors returned from `compute` are delivered to the producer as
/// [`Error::TaskFailed`]; they never take down the executor running them.
#[async_trait]
pub trait Work: Send + 'static {
    /// Value delivered to the producer on success
    type Output: Send + 'static;

    /// Run the work to completion
    async fn compute(self) -> anyhow::Result<Self::Output>;
}

type BoxedCompute<T> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>> + Send>;

/// Work built from an async closure.
///
/// Lets unrelated jobs share one dispatcher as long as they produce the
/// same output type.
pub struct Closure<T> {
    f: BoxedCompute<T>,
}

impl<T: Send + 'static> Closure<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            f: Box::new(move || Box::pin(f())),
        }
    }
}

impl<T> fmt::Debug for Closure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closure")
    }
}

#[async_trait]
impl<T: Send + 'static> Work for Closure<T> {
    type Output = T;

    async fn compute(self) -> anyhow::Result<T> {
        (self.f)().await
    }
}

// ─────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────

/// A submitted unit of work travelling from producer to executor
pub(crate) struct Task<W: Work> {
    pub(crate) id: TaskId,
    pub(crate) payload: W,
    pub(crate) reply: Reply<W::Output>,
    pub(crate) enqueued_at: Instant,
}

impl<W: Work> Task<W> {
    /// Create a task and the handle its producer will wait on
    pub(crate) fn new(id: TaskId, payload: W) -> (Self, ReplyHandle<W::Output>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id,
            payload,
            reply: Reply { tx },
            enqueued_at: Instant::now(),
        };
        let handle = ReplyHandle { id, rx: Some(rx) };
        (task, handle)
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }
}

/// Write side of a task's reply slot.
///
/// `deliver` consumes the reply, so a value can be written at most once.
pub(crate) struct Reply<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Reply<T> {
    /// Hand the outcome to the producer.
    ///
    /// Never blocks. Returns `false` when the producer already dropped its
    /// handle, in which case the value is discarded.
    pub(crate) fn deliver(self, outcome: Result<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────
// Reply Handle
// ─────────────────────────────────────────────────────────────────

/// Producer-held token for retrieving a task's result
#[derive(Debug)]
pub struct ReplyHandle<T> {
    id: TaskId,
    rx: Option<oneshot::Receiver<Result<T>>>,
}

impl<T> ReplyHandle<T> {
    /// Task this handle belongs to
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the value has already been taken from this handle
    pub fn is_consumed(&self) -> bool {
        self.rx.is_none()
    }

    /// Block until the executor delivers the outcome
    pub async fn wait(mut self) -> Result<T> {
        let rx = self.take_receiver()?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ReplyDropped { task_id: self.id }),
        }
    }

    /// Wait at most `timeout` for the outcome.
    ///
    /// On timeout the task keeps running and the handle stays usable, so
    /// the caller may wait again or drop it.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<T> {
        let id = self.id;
        let rx = self
            .rx
            .as_mut()
            .ok_or(Error::ReplyConsumed { task_id: id })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(received) => {
                self.rx = None;
                match received {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::ReplyDropped { task_id: id }),
                }
            }
            Err(_) => Err(Error::AwaitTimeout {
                task_id: id,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Take the outcome if it has been delivered, without waiting
    pub fn try_take(&mut self) -> Result<Option<T>> {
        let id = self.id;
        let rx = self
            .rx
            .as_mut()
            .ok_or(Error::ReplyConsumed { task_id: id })?;

        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                outcome.map(Some)
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Err(Error::ReplyDropped { task_id: id })
            }
        }
    }

    fn take_receiver(&mut self) -> Result<oneshot::Receiver<Result<T>>> {
        self.rx
            .take()
            .ok_or(Error::ReplyConsumed { task_id: self.id })
    }
}
