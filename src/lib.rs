//! gatepool - bounded concurrent task dispatcher
//!
//! Producers submit work and receive a private [`ReplyHandle`]; a pool of
//! executors pulls tasks FIFO from a shared intake, and an
//! [`AdmissionGate`] caps how many task bodies run at the same time.
//!
//! ```no_run
//! use gatepool::{Dispatcher, FnRequest};
//!
//! # async fn demo() -> gatepool::Result<()> {
//! let dispatcher = Dispatcher::new(4, 2, Some(64))?;
//! let handle = dispatcher.submit(FnRequest::new(vec![3, 4, 5], gatepool::sum)).await?;
//! assert_eq!(dispatcher.wait(handle).await?, 12);
//! dispatcher.shutdown(true).await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod version;
pub mod workload;

pub use dispatch::{
    AdmissionGate, Closure, Dispatcher, DispatcherConfig, DispatcherState, DispatcherStats,
    GatePermit, ReplyHandle, TaskId, Work,
};
pub use error::{Error, ErrorCode, Result};
pub use workload::{product, sum, FnRequest, SyntheticJob};
