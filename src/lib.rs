//! timeslice
//!
//! A single-threaded cooperative priority task scheduler. Callers submit
//! tasks at one of five priority levels, optionally delayed; the scheduler
//! runs them in deadline order inside short time slices granted by a host,
//! yielding back between tasks once the slice is used up. Long tasks split
//! themselves into continuations so urgent work can interleave.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use timeslice::{PriorityLevel, Scheduler, TaskOptions, TaskStatus, VirtualHost};
//!
//! let host = Rc::new(VirtualHost::new());
//! let scheduler = Scheduler::new(host.clone());
//!
//! scheduler.schedule_task_with_options(
//!     PriorityLevel::Low,
//!     |_| Ok(TaskStatus::Done),
//!     TaskOptions::delayed(100.0),
//! );
//! scheduler.schedule_task(PriorityLevel::UserBlocking, |_did_timeout| {
//!     // Not finished yet: resume later with a continuation.
//!     Ok(TaskStatus::continue_with(|_| Ok(TaskStatus::Done)))
//! });
//!
//! host.flush_all()?;
//! assert_eq!(scheduler.timer_queue_len(), 0);
//! # Ok::<(), timeslice::SchedulerError>(())
//! ```
//!
//! # Crate Features
//!
//! - `debug`: Log every work-loop pass at `info` level

#![doc(html_root_url = "https://docs.rs/timeslice")]
#![warn(rust_2018_idioms)]

pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::host::{HostBridge, HostConfig, MessageLoopHost, VirtualHost};
pub use runtime::scheduler::{
    PriorityLevel, Scheduler, SchedulerConfig, SchedulerError, TaskHandle, TaskId, TaskOptions,
    TaskStatus, Time,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "timeslice";
