//! Cooperative priority scheduler
//!
//! Tasks are submitted with a [`PriorityLevel`] and an optional delay. Delayed
//! tasks wait in the [`TimerQueue`] keyed by start time; eligible tasks live in
//! the [`TaskQueue`] keyed by expiration time. The scheduler asks its
//! [`HostBridge`] for callback opportunities and drains the task queue in
//! slices, checking `should_yield` between tasks.
//!
//! All state belongs to one [`Scheduler`] instance and is only touched from
//! the thread that owns it. Task callbacks may call back into the scheduler
//! (submit, cancel, query priority) while they run.
//!
//! ```
//! use std::rc::Rc;
//! use timeslice::runtime::host::VirtualHost;
//! use timeslice::runtime::scheduler::{PriorityLevel, Scheduler, TaskStatus};
//!
//! let host = Rc::new(VirtualHost::new());
//! let scheduler = Scheduler::new(host.clone());
//! scheduler.schedule_task(PriorityLevel::Normal, |_did_timeout| Ok(TaskStatus::Done));
//! host.flush_all().unwrap();
//! assert!(scheduler.first_pending_task().is_none());
//! ```

pub mod error;
pub mod heap;
pub mod priority;
pub mod profiling;
pub mod queue;
pub mod task;
mod work_loop;

#[cfg(test)]
mod tests;

pub use error::SchedulerError;
pub use heap::{HeapNode, PriorityHeap};
pub use priority::{timeout_for_priority, PriorityLevel};
pub use profiling::{Profiler, ProfilingEvent, ProfilingEventKind};
pub use queue::{TaskQueue, TimerQueue};
pub use task::{Callback, Task, TaskHandle, TaskId, TaskIdGenerator, TaskOptions, TaskStatus};

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::runtime::host::HostBridge;

/// Milliseconds on the host clock.
pub type Time = f64;

/// Scheduler configuration, typically read from the `[scheduler]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Record task lifecycle events from the start.
    #[serde(default)]
    pub enable_profiling: bool,
    /// Honour `pause_execution`. When off, pausing is ignored.
    #[serde(default = "default_enable_debugging")]
    pub enable_debugging: bool,
    /// Maximum number of profiling events retained.
    #[serde(default = "default_profiling_buffer")]
    pub profiling_buffer: usize,
}

fn default_enable_debugging() -> bool {
    true
}

fn default_profiling_buffer() -> usize {
    4096
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enable_profiling: false,
            enable_debugging: default_enable_debugging(),
            profiling_buffer: default_profiling_buffer(),
        }
    }
}

/// Mutable scheduler state. Only borrowed for short, non-reentrant sections;
/// never held across a task callback or a host call.
#[derive(Debug)]
pub(crate) struct SchedulerState {
    task_queue: TaskQueue,
    timer_queue: TimerQueue,
    ids: TaskIdGenerator,
    current_task: Option<TaskHandle>,
    current_priority_level: PriorityLevel,
    is_paused: bool,
    is_performing_work: bool,
    is_host_callback_scheduled: bool,
    is_host_timeout_scheduled: bool,
    profiler: Profiler,
}

impl SchedulerState {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            task_queue: TaskQueue::new(),
            timer_queue: TimerQueue::new(),
            ids: TaskIdGenerator::new(),
            current_task: None,
            current_priority_level: PriorityLevel::Normal,
            is_paused: false,
            is_performing_work: false,
            is_host_callback_scheduled: false,
            is_host_timeout_scheduled: false,
            profiler: Profiler::new(config.enable_profiling, config.profiling_buffer),
        }
    }
}

struct Inner {
    host: Rc<dyn HostBridge>,
    config: SchedulerConfig,
    state: RefCell<SchedulerState>,
}

/// Handle to a scheduler instance. Cloning is cheap and shares the instance.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self.inner.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Scheduler")
                .field("config", &self.inner.config)
                .field("task_queue", &state.task_queue.len())
                .field("timer_queue", &state.timer_queue.len())
                .field("current_priority_level", &state.current_priority_level)
                .field("is_paused", &state.is_paused)
                .field("is_performing_work", &state.is_performing_work)
                .finish(),
            Err(_) => f.write_str("Scheduler { <borrowed> }"),
        }
    }
}

impl Scheduler {
    /// Create a scheduler on top of `host` with the default configuration.
    pub fn new(host: Rc<dyn HostBridge>) -> Self {
        Self::with_config(host, SchedulerConfig::default())
    }

    pub fn with_config(
        host: Rc<dyn HostBridge>,
        config: SchedulerConfig,
    ) -> Self {
        let state = RefCell::new(SchedulerState::new(&config));
        Self {
            inner: Rc::new(Inner {
                host,
                config,
                state,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The host this scheduler runs on.
    pub fn host(&self) -> &Rc<dyn HostBridge> {
        &self.inner.host
    }

    #[inline]
    fn state_mut(&self) -> RefMut<'_, SchedulerState> {
        self.inner.state.borrow_mut()
    }

    fn downgrade(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    // ------------------------------------------------------------------
    // Submission and cancellation
    // ------------------------------------------------------------------

    /// Submit a task with no delay.
    pub fn schedule_task<F>(
        &self,
        priority_level: PriorityLevel,
        callback: F,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> anyhow::Result<TaskStatus> + 'static,
    {
        self.schedule_task_with_options(priority_level, callback, TaskOptions::default())
    }

    /// Submit a task. The callback never runs synchronously; it runs during a
    /// later work-loop pass.
    pub fn schedule_task_with_options<F>(
        &self,
        priority_level: PriorityLevel,
        callback: F,
        options: TaskOptions,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> anyhow::Result<TaskStatus> + 'static,
    {
        let current_time = self.inner.host.now();
        let start_time = if options.delay > 0.0 {
            current_time + options.delay
        } else {
            current_time
        };

        let mut state = self.state_mut();
        let id = state.ids.next();
        let task = Rc::new(Task::new(id, priority_level, start_time, Box::new(callback)));

        if start_time > current_time {
            state.timer_queue.push(task.clone());
            trace!(
                "{} scheduled at {} priority, starts at {}",
                id,
                priority_level,
                start_time
            );

            if state.task_queue.is_empty() && state.timer_queue.is_head(&task) {
                // All tasks are delayed and this one fires first.
                let cancel_existing = state.is_host_timeout_scheduled;
                state.is_host_timeout_scheduled = true;
                drop(state);
                if cancel_existing {
                    self.inner.host.cancel_timeout();
                }
                self.request_host_timeout(start_time - current_time);
            }
        } else {
            state.task_queue.push(task.clone());
            task.set_queued(true);
            state
                .profiler
                .task_event(ProfilingEventKind::TaskStart, &task, current_time);
            trace!(
                "{} scheduled at {} priority, expires at {}",
                id,
                priority_level,
                task.expiration_time()
            );

            // While performing work the loop picks the task up before it yields.
            if !state.is_host_callback_scheduled && !state.is_performing_work {
                state.is_host_callback_scheduled = true;
                drop(state);
                self.request_host_callback();
            }
        }

        task
    }

    /// Cancel a task. The node stays in its queue and is discarded when it
    /// reaches the front. Cancelling twice is a no-op.
    ///
    /// Cancelling the earliest timer re-arms the host timeout for the next
    /// live timer, or clears it when none is left.
    pub fn cancel_task(
        &self,
        task: &TaskHandle,
    ) {
        if !task.cancel() {
            return;
        }
        trace!("{} cancelled", task.id());

        let current_time = self.inner.host.now();
        if task.is_queued() {
            task.set_queued(false);
            self.state_mut()
                .profiler
                .task_event(ProfilingEventKind::TaskCancel, task, current_time);
        } else {
            self.rearm_timeout_after_cancel(task, current_time);
        }
    }

    fn rearm_timeout_after_cancel(
        &self,
        task: &TaskHandle,
        current_time: Time,
    ) {
        let mut state = self.state_mut();
        if !state.timer_queue.is_head(task) {
            return;
        }
        while state
            .timer_queue
            .peek()
            .is_some_and(|timer| !timer.has_callback())
        {
            state.timer_queue.pop();
        }
        if !state.is_host_timeout_scheduled {
            return;
        }

        let next_start = state.timer_queue.peek().map(|timer| timer.start_time());
        if next_start.is_none() {
            state.is_host_timeout_scheduled = false;
        }
        drop(state);

        self.inner.host.cancel_timeout();
        if let Some(start_time) = next_start {
            trace!("host timeout re-armed for {}", start_time);
            self.request_host_timeout(start_time - current_time);
        }
    }

    // ------------------------------------------------------------------
    // Ambient priority
    // ------------------------------------------------------------------

    /// Ambient priority level. `Normal` outside of any task or
    /// `run_with_priority` scope.
    pub fn current_priority_level(&self) -> PriorityLevel {
        self.inner.state.borrow().current_priority_level
    }

    /// Run `f` with the ambient priority set to `level`, restoring the
    /// previous level afterwards, also when `f` panics.
    pub fn run_with_priority<R, F>(
        &self,
        level: PriorityLevel,
        f: F,
    ) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = PriorityGuard::enter(self, level);
        f()
    }

    /// Run `f` one step below the ambient priority: anything at or above
    /// `Normal` runs at `Normal`, `Low` and `Idle` are kept.
    pub fn run_next<R, F>(
        &self,
        f: F,
    ) -> R
    where
        F: FnOnce() -> R,
    {
        let level = self.current_priority_level().next_level();
        self.run_with_priority(level, f)
    }

    /// Capture the ambient priority now and reinstate it whenever the
    /// returned closure runs.
    pub fn wrap_callback<R, F>(
        &self,
        mut f: F,
    ) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        let parent_priority_level = self.current_priority_level();
        let scheduler = self.clone();
        move || scheduler.run_with_priority(parent_priority_level, &mut f)
    }

    // ------------------------------------------------------------------
    // Host passthrough
    // ------------------------------------------------------------------

    /// Whether the current slice is used up.
    pub fn should_yield(&self) -> bool {
        self.inner.host.should_yield()
    }

    pub fn now(&self) -> Time {
        self.inner.host.now()
    }

    pub fn request_paint(&self) {
        self.inner.host.request_paint();
    }

    /// Change the host's slice length. Invalid rates are logged and leave the
    /// previous setting in place.
    pub fn force_frame_rate(
        &self,
        fps: f64,
    ) -> Result<(), SchedulerError> {
        self.inner.host.force_frame_rate(fps).inspect_err(|e| {
            warn!("force_frame_rate rejected: {}", e);
        })
    }

    // ------------------------------------------------------------------
    // Debugging and introspection
    // ------------------------------------------------------------------

    /// Stop consuming the task queue until `continue_execution`.
    pub fn pause_execution(&self) {
        if !self.inner.config.enable_debugging {
            debug!("pause_execution ignored: debugging disabled");
            return;
        }
        self.state_mut().is_paused = true;
    }

    pub fn continue_execution(&self) {
        let mut state = self.state_mut();
        state.is_paused = false;
        if !state.is_host_callback_scheduled && !state.is_performing_work {
            state.is_host_callback_scheduled = true;
            drop(state);
            self.request_host_callback();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.borrow().is_paused
    }

    pub fn is_performing_work(&self) -> bool {
        self.inner.state.borrow().is_performing_work
    }

    /// Head of the task queue. May be a cancelled task not yet discarded.
    pub fn first_pending_task(&self) -> Option<TaskHandle> {
        self.inner.state.borrow().task_queue.peek().cloned()
    }

    /// Task whose callback is running, if called from inside the work loop.
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.inner.state.borrow().current_task.clone()
    }

    /// Length of the task queue, cancelled entries included.
    pub fn task_queue_len(&self) -> usize {
        self.inner.state.borrow().task_queue.len()
    }

    /// Length of the timer queue, cancelled entries included.
    pub fn timer_queue_len(&self) -> usize {
        self.inner.state.borrow().timer_queue.len()
    }

    /// Whether `task` currently sits in the timer queue.
    pub fn is_in_timer_queue(
        &self,
        task: &TaskHandle,
    ) -> bool {
        self.inner
            .state
            .borrow()
            .timer_queue
            .iter()
            .any(|t| Rc::ptr_eq(t, task))
    }

    /// Whether `task` currently sits in the task queue.
    pub fn is_in_task_queue(
        &self,
        task: &TaskHandle,
    ) -> bool {
        self.inner
            .state
            .borrow()
            .task_queue
            .iter()
            .any(|t| Rc::ptr_eq(t, task))
    }

    // ------------------------------------------------------------------
    // Profiling
    // ------------------------------------------------------------------

    pub fn start_profiling(&self) {
        self.state_mut().profiler.start();
    }

    pub fn stop_profiling(&self) {
        self.state_mut().profiler.stop();
    }

    pub fn is_profiling(&self) -> bool {
        self.inner.state.borrow().profiler.is_enabled()
    }

    /// Drain recorded profiling events.
    pub fn take_profiling_events(&self) -> Vec<ProfilingEvent> {
        self.state_mut().profiler.take()
    }

    /// Recorded profiling events as JSON, without draining them.
    pub fn profiling_json(&self) -> serde_json::Result<String> {
        self.inner.state.borrow().profiler.to_json()
    }

    // ------------------------------------------------------------------
    // Host requests
    // ------------------------------------------------------------------

    fn request_host_callback(&self) {
        debug!("requesting host callback");
        let weak = self.downgrade();
        self.inner
            .host
            .request_callback(Box::new(move |has_time_remaining, initial_time| {
                match weak.upgrade() {
                    Some(inner) => {
                        Scheduler::from_inner(inner).flush_work(has_time_remaining, initial_time)
                    }
                    None => Ok(false),
                }
            }));
    }

    fn request_host_timeout(
        &self,
        delay: Time,
    ) {
        debug!("requesting host timeout in {}ms", delay);
        let weak = self.downgrade();
        self.inner.host.request_timeout(
            Box::new(move |current_time| {
                if let Some(inner) = weak.upgrade() {
                    Scheduler::from_inner(inner).handle_timeout(current_time);
                }
            }),
            delay,
        );
    }
}

/// Restores the ambient priority when dropped.
struct PriorityGuard<'a> {
    scheduler: &'a Scheduler,
    previous: PriorityLevel,
}

impl<'a> PriorityGuard<'a> {
    fn enter(
        scheduler: &'a Scheduler,
        level: PriorityLevel,
    ) -> Self {
        let mut state = scheduler.state_mut();
        let previous = std::mem::replace(&mut state.current_priority_level, level);
        Self {
            scheduler,
            previous,
        }
    }
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.scheduler.inner.state.try_borrow_mut() {
            state.current_priority_level = self.previous;
        }
    }
}
