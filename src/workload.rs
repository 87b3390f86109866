//! Built-in work types
//!
//! - [`FnRequest`]: arguments plus the function to apply to them; the
//!   reply arrives on the submitter's own handle.
//! - [`SyntheticJob`]: sleeps for a fixed time and optionally fails, used
//!   by `gatepool run` to exercise the dispatcher.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;

use crate::dispatch::Work;

// ─────────────────────────────────────────────────────────────────
// Function Request
// ─────────────────────────────────────────────────────────────────

/// Request carrying its arguments and the function that computes the answer
#[derive(Clone)]
pub struct FnRequest {
    pub args: Vec<i64>,
    pub f: fn(&[i64]) -> anyhow::Result<i64>,
}

impl FnRequest {
    pub fn new(args: Vec<i64>, f: fn(&[i64]) -> anyhow::Result<i64>) -> Self {
        Self { args, f }
    }
}

impl fmt::Debug for FnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRequest").field("args", &self.args).finish()
    }
}

#[async_trait]
impl Work for FnRequest {
    type Output = i64;

    async fn compute(self) -> anyhow::Result<i64> {
        (self.f)(&self.args)
    }
}

/// Sum of all arguments. Fails instead of wrapping on overflow.
pub fn sum(args: &[i64]) -> anyhow::Result<i64> {
    args.iter()
        .try_fold(0i64, |acc, &x| acc.checked_add(x))
        .ok_or_else(|| anyhow!("sum of {} values overflows i64", args.len()))
}

/// Product of all arguments (1 for no arguments). Fails on overflow.
pub fn product(args: &[i64]) -> anyhow::Result<i64> {
    args.iter()
        .try_fold(1i64, |acc, &x| acc.checked_mul(x))
        .ok_or_else(|| anyhow!("product of {} values overflows i64", args.len()))
}

// ─────────────────────────────────────────────────────────────────
// Synthetic Job
// ─────────────────────────────────────────────────────────────────

/// Sleep-then-answer job for load runs
#[derive(Debug, Clone)]
pub struct SyntheticJob {
    pub index: u64,
    pub duration: Duration,
    pub fail: bool,
}

impl SyntheticJob {
    pub fn new(index: u64, duration: Duration) -> Self {
        Self {
            index,
            duration,
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Work for SyntheticJob {
    type Output = u64;

    async fn compute(self) -> anyhow::Result<u64> {
        tokio::time::sleep(self.duration).await;
        if self.fail {
            bail!("synthetic job {} failed on request", self.index);
        }
        Ok(self.index)
    }
}

/// Build the job list for a load run.
///
/// `fail_every == n` makes every n-th job (1-based) fail; 0 disables failures.
pub fn synthetic_batch(count: u64, duration: Duration, fail_every: u64) -> Vec<SyntheticJob> {
    (1..=count)
        .map(|index| {
            let job = SyntheticJob::new(index, duration);
            if fail_every > 0 && index % fail_every == 0 {
                job.failing()
            } else {
                job
            }
        })
        .collect()
}
