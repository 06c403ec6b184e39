//! The work loop: timer promotion, delayed wake-ups and time-sliced draining
//! of the task queue.

use std::rc::Rc;

use tracing::{debug, trace};

use super::profiling::ProfilingEventKind;
use super::task::{TaskHandle, TaskStatus};
use super::{PriorityLevel, Scheduler, SchedulerError, Time};

/// Why a work-loop pass stopped.
enum Exit {
    /// Task queue is empty.
    Drained,
    /// Slice ran out with tasks still queued.
    Yielded,
    /// Scheduler is paused. Reported as no more work; `continue_execution`
    /// requests a fresh host callback to resume.
    Paused,
}

/// Bookkeeping held for the duration of a work-loop pass. Dropping it clears
/// the current task, restores the ambient priority and clears the
/// performing-work flag, on success, on error and on panic.
struct WorkGuard<'a> {
    scheduler: &'a Scheduler,
    previous_priority_level: PriorityLevel,
}

impl<'a> WorkGuard<'a> {
    fn enter(scheduler: &'a Scheduler) -> Self {
        let mut state = scheduler.state_mut();
        state.is_performing_work = true;
        Self {
            scheduler,
            previous_priority_level: state.current_priority_level,
        }
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        let current_time = self.scheduler.inner.host.now();
        if let Ok(mut state) = self.scheduler.inner.state.try_borrow_mut() {
            state.current_task = None;
            state.current_priority_level = self.previous_priority_level;
            state.is_performing_work = false;
            state
                .profiler
                .scheduler_event(ProfilingEventKind::SchedulerSuspend, current_time);
        }
    }
}

impl Scheduler {
    /// Move every due timer into the task queue and discard cancelled timers
    /// found at the front. Stops at the first timer that is not yet due.
    pub(crate) fn advance_timers(
        &self,
        current_time: Time,
    ) {
        let mut guard = self.state_mut();
        let state = &mut *guard;

        loop {
            let (cancelled, due) = match state.timer_queue.peek() {
                Some(timer) => (!timer.has_callback(), timer.start_time() <= current_time),
                None => return,
            };

            if cancelled {
                state.timer_queue.pop();
            } else if due {
                if let Some(timer) = state.timer_queue.pop() {
                    trace!("{} promoted to task queue", timer.id());
                    timer.set_queued(true);
                    state
                        .profiler
                        .task_event(ProfilingEventKind::TaskStart, &timer, current_time);
                    state.task_queue.push(timer);
                }
            } else {
                return;
            }
        }
    }

    /// Host entry point for a delayed wake-up.
    pub(crate) fn handle_timeout(
        &self,
        current_time: Time,
    ) {
        self.state_mut().is_host_timeout_scheduled = false;
        self.advance_timers(current_time);

        let mut state = self.state_mut();
        if state.is_host_callback_scheduled {
            return;
        }

        if !state.task_queue.is_empty() {
            state.is_host_callback_scheduled = true;
            drop(state);
            self.request_host_callback();
        } else if let Some(first_timer) = state.timer_queue.peek() {
            let delay = first_timer.start_time() - current_time;
            state.is_host_timeout_scheduled = true;
            drop(state);
            self.request_host_timeout(delay);
        }
    }

    /// Host entry point for a callback opportunity. Returns whether more work
    /// remains, in which case the host should call again soon.
    pub(crate) fn flush_work(
        &self,
        has_time_remaining: bool,
        initial_time: Time,
    ) -> Result<bool, SchedulerError> {
        let cancel_timeout = {
            let mut state = self.state_mut();
            state
                .profiler
                .scheduler_event(ProfilingEventKind::SchedulerUnsuspend, initial_time);
            // A new host callback is needed the next time work is scheduled.
            state.is_host_callback_scheduled = false;
            std::mem::replace(&mut state.is_host_timeout_scheduled, false)
        };
        if cancel_timeout {
            // The loop below takes care of due timers.
            self.inner.host.cancel_timeout();
        }

        let _guard = WorkGuard::enter(self);
        self.work_loop(has_time_remaining, initial_time)
    }

    fn work_loop(
        &self,
        has_time_remaining: bool,
        initial_time: Time,
    ) -> Result<bool, SchedulerError> {
        let host = Rc::clone(&self.inner.host);
        let mut current_time = initial_time;
        let mut executed = 0usize;

        self.advance_timers(current_time);
        let mut current_task = self.load_current_task();

        let exit = loop {
            let Some(task) = current_task else {
                break Exit::Drained;
            };
            if self.is_paused() {
                break Exit::Paused;
            }

            if task.expiration_time() > current_time
                && (!has_time_remaining || host.should_yield())
            {
                // This task hasn't expired and the slice is used up.
                break Exit::Yielded;
            }

            match task.take_callback() {
                Some(callback) => {
                    let did_timeout = task.expiration_time() <= current_time;
                    {
                        let mut state = self.state_mut();
                        state.current_priority_level = task.priority_level();
                        state
                            .profiler
                            .task_event(ProfilingEventKind::TaskRun, &task, current_time);
                    }
                    trace!("running {} (did_timeout = {})", task.id(), did_timeout);

                    let result = callback(did_timeout);
                    current_time = host.now();
                    executed += 1;

                    match result {
                        Ok(TaskStatus::Continue(next)) if !task.is_cancelled() => {
                            task.set_callback(next);
                            trace!("{} yielded a continuation", task.id());
                            self.state_mut().profiler.task_event(
                                ProfilingEventKind::TaskYield,
                                &task,
                                current_time,
                            );
                        }
                        Ok(_) => {
                            // Done, or cancelled from inside its own callback.
                            self.finish_task(&task, current_time);
                        }
                        Err(source) => {
                            self.fail_task(&task, current_time);
                            debug!("{} failed, unwinding work loop", task.id());
                            return Err(SchedulerError::Task {
                                id: task.id(),
                                source,
                            });
                        }
                    }
                    self.advance_timers(current_time);
                }
                None => {
                    // Cancelled.
                    self.state_mut().task_queue.pop();
                }
            }

            current_task = self.load_current_task();
        };

        #[cfg(feature = "debug")]
        tracing::info!(
            "work loop pass ran {} callbacks in {:.3}ms",
            executed,
            current_time - initial_time
        );
        #[cfg(not(feature = "debug"))]
        debug!(
            "work loop pass ran {} callbacks in {:.3}ms",
            executed,
            current_time - initial_time
        );

        match exit {
            Exit::Yielded => Ok(true),
            Exit::Paused => Ok(false),
            Exit::Drained => {
                let mut state = self.state_mut();
                if let Some(first_timer) = state.timer_queue.peek() {
                    let delay = first_timer.start_time() - current_time;
                    state.is_host_timeout_scheduled = true;
                    drop(state);
                    self.request_host_timeout(delay);
                }
                Ok(false)
            }
        }
    }

    /// Peek the task queue and record the head as the current task.
    fn load_current_task(&self) -> Option<TaskHandle> {
        let mut state = self.state_mut();
        let head = state.task_queue.peek().cloned();
        state.current_task = head.clone();
        head
    }

    fn finish_task(
        &self,
        task: &TaskHandle,
        current_time: Time,
    ) {
        let mut state = self.state_mut();
        if task.is_queued() {
            task.set_queued(false);
            state
                .profiler
                .task_event(ProfilingEventKind::TaskComplete, task, current_time);
        }
        trace!("{} completed", task.id());
        if state.task_queue.is_head(task) {
            state.task_queue.pop();
        }
    }

    fn fail_task(
        &self,
        task: &TaskHandle,
        current_time: Time,
    ) {
        let mut state = self.state_mut();
        task.set_queued(false);
        state
            .profiler
            .task_event(ProfilingEventKind::TaskError, task, current_time);
        if state.task_queue.is_head(task) {
            state.task_queue.pop();
        }
    }
}
