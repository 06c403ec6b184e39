//! Scheduler errors.

use thiserror::Error;

use super::task::TaskId;

/// Errors surfaced by the scheduler and its hosts.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `force_frame_rate` was given a value outside `0..=125`.
    #[error(
        "invalid frame rate {0}: forceFrameRate takes a value between 0 and 125, \
         forcing frame rates higher than 125 fps is not supported"
    )]
    InvalidFrameRate(f64),

    /// A task callback failed. The task has already left the queue and is
    /// not retried.
    #[error("{id} failed: {source}")]
    Task {
        id: TaskId,
        #[source]
        source: anyhow::Error,
    },
}

impl SchedulerError {
    /// Id of the failing task, if this error came from a task.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SchedulerError::Task { id, .. } => Some(*id),
            SchedulerError::InvalidFrameRate(_) => None,
        }
    }
}
