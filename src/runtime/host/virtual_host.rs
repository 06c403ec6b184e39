//! Deterministic host driven by a virtual clock.
//!
//! Time only moves when `advance_time` is called (by the test, or by a task
//! simulating its own cost). Work callbacks and timeouts only run when the
//! caller flushes them, so every interleaving is reproducible.

use std::cell::Cell;

use tracing::warn;

use super::{
    yield_interval_for_frame_rate, HostBridge, HostCallback, HostConfig, PendingCallback,
    PendingTimeout, TimeoutCallback, DEFAULT_YIELD_INTERVAL,
};
use crate::runtime::scheduler::{SchedulerError, Time};

/// Test double for [`HostBridge`].
pub struct VirtualHost {
    current_time: Cell<Time>,
    default_yield_interval: Time,
    yield_interval: Cell<Time>,
    deadline: Cell<Time>,
    forced_yield: Cell<Option<bool>>,
    has_time_remaining: Cell<bool>,
    paint_requests: Cell<usize>,
    callback: PendingCallback,
    timeout: PendingTimeout,
}

impl std::fmt::Debug for VirtualHost {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("VirtualHost")
            .field("current_time", &self.current_time.get())
            .field("yield_interval", &self.yield_interval.get())
            .field("deadline", &self.deadline.get())
            .field("forced_yield", &self.forced_yield.get())
            .field("callback_pending", &self.callback.is_pending())
            .field("timeout_at", &self.timeout.fire_at())
            .finish()
    }
}

impl VirtualHost {
    /// Clock at 0, 5 ms slices.
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self {
            current_time: Cell::new(0.0),
            default_yield_interval: config.yield_interval_ms,
            yield_interval: Cell::new(config.yield_interval_ms),
            deadline: Cell::new(0.0),
            forced_yield: Cell::new(None),
            has_time_remaining: Cell::new(config.assume_time_remaining),
            paint_requests: Cell::new(0),
            callback: PendingCallback::default(),
            timeout: PendingTimeout::default(),
        }
    }

    /// Move the clock forward. Nothing runs until the next flush.
    pub fn advance_time(
        &self,
        ms: Time,
    ) {
        self.current_time.set(self.current_time.get() + ms.max(0.0));
    }

    /// Set the clock to an absolute time, never moving it backwards.
    pub fn set_time(
        &self,
        time: Time,
    ) {
        if time > self.current_time.get() {
            self.current_time.set(time);
        }
    }

    /// Force `should_yield` to a fixed answer, ignoring the slice deadline.
    pub fn set_should_yield(
        &self,
        should_yield: bool,
    ) {
        self.forced_yield.set(Some(should_yield));
    }

    /// Go back to deadline-based yielding.
    pub fn clear_should_yield(&self) {
        self.forced_yield.set(None);
    }

    /// Value passed as `has_time_remaining` on the next flush.
    pub fn set_has_time_remaining(
        &self,
        has_time_remaining: bool,
    ) {
        self.has_time_remaining.set(has_time_remaining);
    }

    pub fn yield_interval(&self) -> Time {
        self.yield_interval.get()
    }

    pub fn has_pending_callback(&self) -> bool {
        self.callback.is_pending()
    }

    /// Absolute time of the pending delayed callback.
    pub fn pending_timeout_at(&self) -> Option<Time> {
        self.timeout.fire_at()
    }

    /// How many times `request_paint` was called.
    pub fn paint_requests(&self) -> usize {
        self.paint_requests.get()
    }

    /// Run one work-loop slice. Returns `Ok(None)` if no callback is pending,
    /// otherwise whether more work remains.
    pub fn flush_step(&self) -> Result<Option<bool>, SchedulerError> {
        let current_time = self.current_time.get();
        self.deadline
            .set(current_time + self.yield_interval.get());
        self.callback
            .invoke(self.has_time_remaining.get(), current_time)
            .transpose()
    }

    /// Fire the delayed callback if it is due. Returns whether it fired.
    pub fn fire_due_timeout(&self) -> bool {
        self.timeout.fire_if_due(self.current_time.get())
    }

    /// Jump the clock to the pending delayed callback and fire it.
    pub fn run_next_timeout(&self) -> bool {
        match self.timeout.fire_at() {
            Some(at) => {
                self.set_time(at);
                self.fire_due_timeout()
            }
            None => false,
        }
    }

    /// Flush until nothing is pending, jumping the clock forward to each
    /// delayed callback in turn.
    ///
    /// With `set_should_yield(true)` and unexpired tasks queued this never
    /// finishes; use `flush_step` for those cases.
    pub fn flush_all(&self) -> Result<(), SchedulerError> {
        loop {
            if self.fire_due_timeout() {
                continue;
            }
            if self.callback.is_pending() {
                self.flush_step()?;
                continue;
            }
            if !self.run_next_timeout() {
                return Ok(());
            }
        }
    }

    /// Flush work and due timeouts without moving the clock.
    pub fn flush_expired(&self) -> Result<(), SchedulerError> {
        loop {
            if self.fire_due_timeout() {
                continue;
            }
            match self.flush_step()? {
                Some(true) => {}
                Some(false) | None => {
                    if !self.callback.is_pending() && !self.fire_due_timeout() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for VirtualHost {
    fn now(&self) -> Time {
        self.current_time.get()
    }

    fn request_callback(
        &self,
        callback: HostCallback,
    ) {
        self.callback.set(callback);
    }

    fn cancel_callback(&self) {
        self.callback.clear();
    }

    fn request_timeout(
        &self,
        callback: TimeoutCallback,
        delay: Time,
    ) {
        self.timeout
            .set(self.current_time.get() + delay.max(0.0), callback);
    }

    fn cancel_timeout(&self) {
        self.timeout.clear();
    }

    fn should_yield(&self) -> bool {
        match self.forced_yield.get() {
            Some(answer) => answer,
            None => self.current_time.get() >= self.deadline.get(),
        }
    }

    fn request_paint(&self) {
        self.paint_requests.set(self.paint_requests.get() + 1);
    }

    fn force_frame_rate(
        &self,
        fps: f64,
    ) -> Result<(), SchedulerError> {
        let default = if self.default_yield_interval > 0.0 {
            self.default_yield_interval
        } else {
            DEFAULT_YIELD_INTERVAL
        };
        match yield_interval_for_frame_rate(fps, default) {
            Ok(interval) => {
                self.yield_interval.set(interval);
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }
}
