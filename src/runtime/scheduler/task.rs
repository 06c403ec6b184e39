//! Task definitions for the scheduler.
//!
//! A [`Task`] is shared between the queue it lives in and the handle returned
//! to the caller, so its mutable parts (callback, sort index, flags) use
//! interior mutability. Everything here is single-threaded.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::heap::HeapNode;
use super::priority::PriorityLevel;
use super::Time;

/// Unique task identifier. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl From<TaskId> for u64 {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Work attached to a task. Receives `did_timeout`, which is true when the
/// task's deadline had already passed when it was invoked.
pub type Callback = Box<dyn FnOnce(bool) -> anyhow::Result<TaskStatus>>;

/// What a callback reports back to the work loop.
pub enum TaskStatus {
    /// The task is finished and can leave the queue.
    Done,
    /// The task has more work; run this callback on the next iteration.
    Continue(Callback),
}

impl TaskStatus {
    /// Build a continuation from a closure.
    pub fn continue_with<F>(callback: F) -> Self
    where
        F: FnOnce(bool) -> anyhow::Result<TaskStatus> + 'static,
    {
        TaskStatus::Continue(Box::new(callback))
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl std::fmt::Debug for TaskStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            TaskStatus::Done => f.write_str("Done"),
            TaskStatus::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

/// Options accepted by `Scheduler::schedule_task_with_options`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskOptions {
    /// Milliseconds to wait before the task becomes eligible. Values `<= 0`
    /// mean no delay.
    pub delay: Time,
}

impl TaskOptions {
    /// Options with the given delay.
    #[inline]
    pub fn delayed(delay: Time) -> Self {
        Self { delay }
    }
}

/// Shared handle to a scheduled task.
pub type TaskHandle = Rc<Task>;

/// A unit of schedulable work.
pub struct Task {
    id: TaskId,
    callback: RefCell<Option<Callback>>,
    priority_level: PriorityLevel,
    start_time: Time,
    expiration_time: Time,
    sort_index: Cell<Time>,
    cancelled: Cell<bool>,
    /// Set while the task sits in the task queue; only tracked for profiling.
    is_queued: Cell<bool>,
}

impl std::fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority_level", &self.priority_level)
            .field("start_time", &self.start_time)
            .field("expiration_time", &self.expiration_time)
            .field("sort_index", &self.sort_index.get())
            .field("has_callback", &self.has_callback())
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        priority_level: PriorityLevel,
        start_time: Time,
        callback: Callback,
    ) -> Self {
        Self {
            id,
            callback: RefCell::new(Some(callback)),
            priority_level,
            start_time,
            expiration_time: start_time + priority_level.timeout(),
            sort_index: Cell::new(-1.0),
            cancelled: Cell::new(false),
            is_queued: Cell::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn priority_level(&self) -> PriorityLevel {
        self.priority_level
    }

    #[inline]
    pub fn start_time(&self) -> Time {
        self.start_time
    }

    #[inline]
    pub fn expiration_time(&self) -> Time {
        self.expiration_time
    }

    /// Current heap key: the start time while delayed, the expiration time
    /// once eligible.
    #[inline]
    pub fn sort_index(&self) -> Time {
        self.sort_index.get()
    }

    /// Whether `Scheduler::cancel_task` was called on this task.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// False once cancelled, finished, or while its callback is executing.
    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }

    #[inline]
    pub(crate) fn set_sort_index(
        &self,
        sort_index: Time,
    ) {
        self.sort_index.set(sort_index);
    }

    /// Detach the callback so the task reads as inert while it runs.
    #[inline]
    pub(crate) fn take_callback(&self) -> Option<Callback> {
        self.callback.borrow_mut().take()
    }

    #[inline]
    pub(crate) fn set_callback(
        &self,
        callback: Callback,
    ) {
        *self.callback.borrow_mut() = Some(callback);
    }

    /// Tombstone the task. Returns `true` on the first call only.
    pub(crate) fn cancel(&self) -> bool {
        // Dropping the callback outside the borrow lets its destructor touch
        // the scheduler safely.
        let callback = self.callback.borrow_mut().take();
        drop(callback);
        !self.cancelled.replace(true)
    }

    #[inline]
    pub(crate) fn is_queued(&self) -> bool {
        self.is_queued.get()
    }

    #[inline]
    pub(crate) fn set_queued(
        &self,
        queued: bool,
    ) {
        self.is_queued.set(queued);
    }
}

impl HeapNode for Task {
    #[inline]
    fn sort_index(&self) -> Time {
        self.sort_index.get()
    }

    #[inline]
    fn node_id(&self) -> u64 {
        self.id.0
    }
}

/// Generator for task ids, starting at 1.
#[derive(Debug)]
pub struct TaskIdGenerator {
    next_id: u64,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        TaskId(id)
    }
}

impl Default for TaskIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
