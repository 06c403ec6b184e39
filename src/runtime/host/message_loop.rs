//! Real-clock host that runs the message loop on the calling thread.
//!
//! Each loop turn either runs one slice of scheduler work or fires the
//! pending delayed callback. A slice starts by setting `deadline = now +
//! yield_interval`; `should_yield` reports true once the deadline passes.
//! When nothing is runnable the thread sleeps until the delayed callback is
//! due, and `run` returns once neither is pending.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{
    yield_interval_for_frame_rate, HostBridge, HostCallback, HostConfig, PendingCallback,
    PendingTimeout, TimeoutCallback,
};
use crate::runtime::scheduler::{SchedulerError, Time};

/// Probe reporting whether user input is waiting to be handled.
pub type InputPendingProbe = Box<dyn Fn() -> bool>;

/// Default host adapter.
pub struct MessageLoopHost {
    epoch: Instant,
    config: HostConfig,
    yield_interval: Cell<Time>,
    deadline: Cell<Time>,
    slice_start: Cell<Time>,
    needs_paint: Cell<bool>,
    input_pending: RefCell<Option<InputPendingProbe>>,
    callback: PendingCallback,
    timeout: PendingTimeout,
}

impl std::fmt::Debug for MessageLoopHost {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MessageLoopHost")
            .field("config", &self.config)
            .field("yield_interval", &self.yield_interval.get())
            .field("deadline", &self.deadline.get())
            .field("needs_paint", &self.needs_paint.get())
            .field("callback_pending", &self.callback.is_pending())
            .field("timeout_at", &self.timeout.fire_at())
            .finish()
    }
}

impl MessageLoopHost {
    /// Create a host with the default 5 ms slice.
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self {
            epoch: Instant::now(),
            yield_interval: Cell::new(config.yield_interval_ms),
            config,
            deadline: Cell::new(0.0),
            slice_start: Cell::new(0.0),
            needs_paint: Cell::new(false),
            input_pending: RefCell::new(None),
            callback: PendingCallback::default(),
            timeout: PendingTimeout::default(),
        }
    }

    /// Install an input-pending probe. With a probe installed, slices may run
    /// past their deadline until input or a paint request shows up, bounded
    /// by `max_yield_interval_ms`.
    pub fn set_input_pending_probe<F>(
        &self,
        probe: F,
    ) where
        F: Fn() -> bool + 'static,
    {
        *self.input_pending.borrow_mut() = Some(Box::new(probe));
    }

    /// Current slice length in milliseconds.
    pub fn yield_interval(&self) -> Time {
        self.yield_interval.get()
    }

    /// Whether there is anything left for `run` to do.
    pub fn has_pending_work(&self) -> bool {
        self.callback.is_pending() || self.timeout.fire_at().is_some()
    }

    /// Run until no work callback and no delayed callback remain.
    ///
    /// A failing task stops the loop and its error is returned. The work
    /// callback stays posted, so calling `run` again resumes the remaining
    /// tasks.
    pub fn run(&self) -> Result<(), SchedulerError> {
        loop {
            let now = self.now();
            if self.timeout.fire_if_due(now) {
                continue;
            }

            if self.callback.is_pending() {
                self.run_slice()?;
                continue;
            }

            match self.timeout.fire_at() {
                Some(at) => {
                    let wait = (at - self.now()).max(0.0);
                    debug!("message loop idle, sleeping {:.3}ms", wait);
                    std::thread::sleep(sleep_duration(wait));
                }
                None => return Ok(()),
            }
        }
    }

    /// Run a single slice of work, if a work callback is pending.
    ///
    /// Returns whether more work remains.
    pub fn run_slice(&self) -> Result<bool, SchedulerError> {
        let current_time = self.now();
        self.slice_start.set(current_time);
        self.deadline.set(current_time + self.yield_interval.get());

        let result = self
            .callback
            .invoke(self.config.assume_time_remaining, current_time);

        // Yielding gives the host a chance to paint.
        self.needs_paint.set(false);

        match result {
            Some(result) => result,
            None => Ok(false),
        }
    }
}

/// Convert a wait in milliseconds to a sleep. Waits too long for a
/// `Duration` saturate.
fn sleep_duration(wait: Time) -> Duration {
    Duration::try_from_secs_f64(wait.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

impl Default for MessageLoopHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for MessageLoopHost {
    fn now(&self) -> Time {
        self.epoch.elapsed().as_secs_f64() * 1000.0
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
        let fire_at = self.now() + delay.max(0.0);
        self.timeout.set(fire_at, callback);
    }

    fn cancel_timeout(&self) {
        self.timeout.clear();
    }

    fn should_yield(&self) -> bool {
        let current_time = self.now();
        if current_time < self.deadline.get() {
            return false;
        }

        let probe = self.input_pending.borrow();
        match probe.as_ref() {
            Some(input_pending) => {
                if self.needs_paint.get() || input_pending() {
                    return true;
                }
                current_time - self.slice_start.get() >= self.config.max_yield_interval_ms
            }
            None => true,
        }
    }

    fn request_paint(&self) {
        self.needs_paint.set(true);
    }

    fn force_frame_rate(
        &self,
        fps: f64,
    ) -> Result<(), SchedulerError> {
        match yield_interval_for_frame_rate(fps, self.config.yield_interval_ms) {
            Ok(interval) => {
                debug!("yield interval set to {}ms", interval);
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
