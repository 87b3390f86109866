//! Executor loops
//!
//! Two shapes share one execution path:
//! - Fixed pool: `workers` long-lived loops pull from the intake, take a
//!   gate slot, run the task and go back for the next one.
//! - Gate-only: a single acceptor pulls from the intake, takes a gate slot
//!   and spawns one short-lived task per submission carrying that slot.
//!
//! Either way a loop only exits once the intake is closed and empty, so
//! nothing that was queued is ever dropped.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Error;

use super::gate::{AdmissionGate, GatePermit};
use super::intake::{next_task, SharedIntake};
use super::stats::{DispatcherState, StatsRecorder};
use super::task::{Task, Work};

/// Everything an executor loop needs, shared across loops
pub(crate) struct PoolShared<W: Work> {
    pub(crate) intake: SharedIntake<W>,
    pub(crate) gate: AdmissionGate,
    pub(crate) stats: Arc<StatsRecorder>,
    pub(crate) state: Arc<watch::Sender<DispatcherState>>,
    pub(crate) live_loops: AtomicUsize,
}

/// Start the executor loops for a dispatcher.
///
/// `workers == 0` selects gate-only mode.
pub(crate) fn spawn_pool<W: Work>(shared: Arc<PoolShared<W>>, workers: usize) -> Vec<JoinHandle<()>> {
    if workers == 0 {
        shared.live_loops.store(1, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            acceptor_loop(&shared).await;
            loop_exited(&shared);
        });
        return vec![handle];
    }

    shared.live_loops.store(workers, Ordering::SeqCst);
    (0..workers)
        .map(|worker| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                worker_loop(worker, &shared).await;
                loop_exited(&shared);
            })
        })
        .collect()
}

/// Mark the dispatcher closed once the last loop is gone
fn loop_exited<W: Work>(shared: &PoolShared<W>) {
    if shared.live_loops.fetch_sub(1, Ordering::AcqRel) == 1 {
        shared.state.send_replace(DispatcherState::Closed);
        info!("All executors exited, dispatcher closed");
    }
}

// ─────────────────────────────────────────────────────────────────
// Fixed Pool
// ─────────────────────────────────────────────────────────────────

async fn worker_loop<W: Work>(worker: usize, shared: &PoolShared<W>) {
    debug!(worker, "Worker started");

    while let Some(task) = next_task(&shared.intake).await {
        let permit = shared.gate.acquire().await;
        execute(task, permit, &shared.stats, Some(worker)).await;
    }

    debug!(worker, "Intake drained, worker exiting");
}

// ─────────────────────────────────────────────────────────────────
// Gate-Only
// ─────────────────────────────────────────────────────────────────

async fn acceptor_loop<W: Work>(shared: &PoolShared<W>) {
    debug!("Acceptor started (gate-only mode)");
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = running.join_next(), if !running.is_empty() => {
                log_join_failure(joined);
            }
            next = next_task(&shared.intake) => {
                let Some(task) = next else { break };

                // Slot is taken before spawning, so at most `capacity`
                // per-task executions exist at once.
                let permit = shared.gate.acquire().await;
                let stats = Arc::clone(&shared.stats);
                running.spawn(async move {
                    execute(task, permit, &stats, None).await;
                });
            }
        }
    }

    debug!(remaining = running.len(), "Intake drained, waiting for running tasks");
    while let Some(joined) = running.join_next().await {
        log_join_failure(joined);
    }
    debug!("Acceptor exiting");
}

fn log_join_failure(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Per-task executor ended abnormally");
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Execution
// ─────────────────────────────────────────────────────────────────

/// Run one admitted task and deliver its outcome.
///
/// The body runs in its own spawned task so a panic is contained and
/// reported as a failure. Counters are updated before the reply is
/// written, so a producer that has its result already sees the task as
/// finished; the slot is released last.
pub(crate) async fn execute<W: Work>(
    task: Task<W>,
    permit: GatePermit,
    stats: &StatsRecorder,
    worker: Option<usize>,
) {
    let Task {
        id,
        payload,
        reply,
        enqueued_at,
    } = task;
    let queued_ms = enqueued_at.elapsed().as_millis() as u64;
    let started = Instant::now();
    debug!(task_id = %id, worker = ?worker, queued_ms, "Task started");

    let outcome = match tokio::spawn(payload.compute()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::task_failed(id, format!("{:#}", e))),
        Err(join) if join.is_panic() => Err(Error::task_failed(
            id,
            format!("task panicked: {}", panic_message(join.into_panic())),
        )),
        Err(join) => Err(Error::task_failed(id, format!("task aborted: {}", join))),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(_) => {
            stats.record_completed();
            debug!(task_id = %id, elapsed_ms, "Task completed");
        }
        Err(e) => {
            stats.record_failed();
            warn!(task_id = %id, elapsed_ms, error = %e, "Task failed");
        }
    }

    if !reply.deliver(outcome) {
        stats.record_abandoned();
        debug!(task_id = %id, "Producer stopped waiting; result discarded");
    }
    permit.release();
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
