//! Shared FIFO intake between producers and executors.
//!
//! Wraps either a bounded or an unbounded `tokio::sync::mpsc` channel.
//! The receiving half is shared by all executors behind an async mutex;
//! whichever executor holds the lock takes the next task in submission
//! order. Closing happens by dropping every sender, after which receivers
//! still yield the tasks already queued before returning `None`.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use super::task::{Task, Work};

/// Why a non-blocking enqueue did not happen
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TryEnqueueError {
    Full,
    Closed,
}

pub(crate) enum IntakeSender<W: Work> {
    Bounded(mpsc::Sender<Task<W>>),
    Unbounded(mpsc::UnboundedSender<Task<W>>),
}

impl<W: Work> Clone for IntakeSender<W> {
    fn clone(&self) -> Self {
        match self {
            IntakeSender::Bounded(tx) => IntakeSender::Bounded(tx.clone()),
            IntakeSender::Unbounded(tx) => IntakeSender::Unbounded(tx.clone()),
        }
    }
}

impl<W: Work> IntakeSender<W> {
    /// Wait for room on a bounded intake and hold it.
    ///
    /// Nothing is queued until [`IntakeSlot::fill`] is called, so dropping
    /// the slot gives the room back. `None` once every receiver is gone.
    pub(crate) async fn reserve(&self) -> Option<IntakeSlot<'_, W>> {
        match self {
            IntakeSender::Bounded(tx) => tx.reserve().await.ok().map(IntakeSlot::Bounded),
            IntakeSender::Unbounded(tx) => Some(IntakeSlot::Unbounded(tx)),
        }
    }

    /// Enqueue only if there is room right now
    pub(crate) fn try_send(&self, task: Task<W>) -> Result<(), TryEnqueueError> {
        match self {
            IntakeSender::Bounded(tx) => tx.try_send(task).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TryEnqueueError::Full,
                mpsc::error::TrySendError::Closed(_) => TryEnqueueError::Closed,
            }),
            IntakeSender::Unbounded(tx) => tx.send(task).map_err(|_| TryEnqueueError::Closed),
        }
    }
}

/// Room reserved in an intake for exactly one task
pub(crate) enum IntakeSlot<'a, W: Work> {
    Bounded(mpsc::Permit<'a, Task<W>>),
    Unbounded(&'a mpsc::UnboundedSender<Task<W>>),
}

impl<W: Work> IntakeSlot<'_, W> {
    /// Queue the task into the reserved room. Never waits.
    pub(crate) fn fill(self, task: Task<W>) -> Result<(), TryEnqueueError> {
        match self {
            IntakeSlot::Bounded(permit) => {
                permit.send(task);
                Ok(())
            }
            IntakeSlot::Unbounded(tx) => tx.send(task).map_err(|_| TryEnqueueError::Closed),
        }
    }
}

pub(crate) enum IntakeReceiver<W: Work> {
    Bounded(mpsc::Receiver<Task<W>>),
    Unbounded(mpsc::UnboundedReceiver<Task<W>>),
}

impl<W: Work> IntakeReceiver<W> {
    /// Next task in FIFO order, or `None` once closed and drained
    pub(crate) async fn recv(&mut self) -> Option<Task<W>> {
        match self {
            IntakeReceiver::Bounded(rx) => rx.recv().await,
            IntakeReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Number of tasks waiting in the channel
    pub(crate) fn len(&self) -> usize {
        match self {
            IntakeReceiver::Bounded(rx) => rx.len(),
            IntakeReceiver::Unbounded(rx) => rx.len(),
        }
    }
}

/// Receiving half shared by every executor
pub(crate) type SharedIntake<W> = Arc<Mutex<IntakeReceiver<W>>>;

/// Build an intake. `None` means unbounded.
pub(crate) fn intake<W: Work>(bound: Option<usize>) -> (IntakeSender<W>, SharedIntake<W>) {
    let (tx, rx) = match bound {
        Some(bound) => {
            let (tx, rx) = mpsc::channel(bound);
            (IntakeSender::Bounded(tx), IntakeReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (IntakeSender::Unbounded(tx), IntakeReceiver::Unbounded(rx))
        }
    };
    (tx, Arc::new(Mutex::new(rx)))
}

/// Pull the next task from a shared intake
pub(crate) async fn next_task<W: Work>(intake: &SharedIntake<W>) -> Option<Task<W>> {
    let mut rx = intake.lock().await;
    let task = rx.recv().await;
    if let Some(task) = &task {
        trace!(task_id = %task.id(), remaining = rx.len(), "Task taken from intake");
    }
    task
}
