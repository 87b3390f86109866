//! Bounded concurrent dispatch
//!
//! Handles the request lifecycle:
//! - Accepting work from producers into a shared FIFO intake
//! - Running it on a pool of executors under an admission gate
//! - Delivering each outcome on the submitter's private reply slot
//! - Cooperative shutdown with optional drain

mod dispatcher;
mod gate;
mod intake;
mod pool;
mod stats;
mod task;

pub use dispatcher::*;
pub use gate::{AdmissionGate, GatePermit};
pub use stats::{DispatcherState, DispatcherStats};
pub use task::{Closure, ReplyHandle, TaskId, Work};
