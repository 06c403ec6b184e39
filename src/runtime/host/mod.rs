//! Host integration
//!
//! The scheduler never drives itself: it asks a [`HostBridge`] for callback
//! opportunities and delayed wake-ups, and asks it whether the current slice
//! is used up. Two hosts ship with the crate:
//!
//! - [`MessageLoopHost`]: real monotonic clock, runs the loop on the calling
//!   thread.
//! - [`VirtualHost`]: virtual clock, stepped by hand. Used by the tests.

pub mod message_loop;
pub mod virtual_host;

pub use message_loop::MessageLoopHost;
pub use virtual_host::VirtualHost;

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

use crate::runtime::scheduler::{SchedulerError, Time};

/// Default slice length in milliseconds.
pub const DEFAULT_YIELD_INTERVAL: Time = 5.0;

/// Past the slice deadline, hosts that can detect pending input keep going
/// until this much time has elapsed since the slice started.
pub const DEFAULT_MAX_YIELD_INTERVAL: Time = 300.0;

/// Highest frame rate accepted by `force_frame_rate`.
pub const MAX_FRAME_RATE: f64 = 125.0;

/// Work-loop entry point handed to the host. Called with
/// `(has_time_remaining, current_time)`; returns whether more work remains.
pub type HostCallback = Box<dyn FnMut(bool, Time) -> Result<bool, SchedulerError>>;

/// Delayed wake-up handed to the host. Called with the current time.
pub type TimeoutCallback = Box<dyn FnOnce(Time)>;

/// Services the scheduler needs from the environment it runs in.
pub trait HostBridge {
    /// Monotonic time in milliseconds.
    fn now(&self) -> Time;

    /// Ask to be invoked at the next opportunity. Replaces any callback
    /// already pending.
    fn request_callback(
        &self,
        callback: HostCallback,
    );

    /// Drop the pending work callback, if any.
    fn cancel_callback(&self);

    /// Ask for `callback` to run once `delay` milliseconds have elapsed. Only
    /// one delayed callback is pending at a time; a new request replaces it.
    fn request_timeout(
        &self,
        callback: TimeoutCallback,
        delay: Time,
    );

    /// Drop the pending delayed callback, if any.
    fn cancel_timeout(&self);

    /// Whether the current slice should end now.
    fn should_yield(&self) -> bool;

    /// Hint that a visual flush is wanted soon.
    fn request_paint(&self) {}

    /// Change the slice length to match `fps`. `0` restores the default.
    fn force_frame_rate(
        &self,
        fps: f64,
    ) -> Result<(), SchedulerError>;
}

/// Host-side tuning, typically read from the `[host]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Slice length in milliseconds.
    #[serde(default = "default_yield_interval")]
    pub yield_interval_ms: Time,
    /// Upper bound on a slice when input detection is available.
    #[serde(default = "default_max_yield_interval")]
    pub max_yield_interval_ms: Time,
    /// Value passed as `has_time_remaining` to the work loop. When `true`,
    /// slice termination depends on `should_yield` alone.
    #[serde(default = "default_assume_time_remaining")]
    pub assume_time_remaining: bool,
}

fn default_yield_interval() -> Time {
    DEFAULT_YIELD_INTERVAL
}

fn default_max_yield_interval() -> Time {
    DEFAULT_MAX_YIELD_INTERVAL
}

fn default_assume_time_remaining() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            yield_interval_ms: DEFAULT_YIELD_INTERVAL,
            max_yield_interval_ms: DEFAULT_MAX_YIELD_INTERVAL,
            assume_time_remaining: true,
        }
    }
}

/// Slice length for a requested frame rate.
///
/// `0` resets to `default`; `0 < fps <= 125` gives `floor(1000 / fps)`.
/// Anything else (negative, above 125, NaN) is rejected.
pub fn yield_interval_for_frame_rate(
    fps: f64,
    default: Time,
) -> Result<Time, SchedulerError> {
    if fps.is_nan() || fps < 0.0 || fps > MAX_FRAME_RATE {
        return Err(SchedulerError::InvalidFrameRate(fps));
    }
    if fps > 0.0 {
        Ok((1000.0 / fps).floor())
    } else {
        Ok(default)
    }
}

/// Single pending work callback, shared by the bundled hosts.
///
/// Every request or cancel bumps a generation counter, so a callback that
/// reports more work is only re-posted if nobody replaced or cancelled it
/// while it was running.
#[derive(Default)]
pub(crate) struct PendingCallback {
    slot: RefCell<Option<HostCallback>>,
    generation: Cell<u64>,
}

impl PendingCallback {
    pub(crate) fn set(
        &self,
        callback: HostCallback,
    ) {
        self.generation.set(self.generation.get() + 1);
        *self.slot.borrow_mut() = Some(callback);
    }

    pub(crate) fn clear(&self) {
        self.generation.set(self.generation.get() + 1);
        let old = self.slot.borrow_mut().take();
        drop(old);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Run the pending callback once. Returns `None` when nothing is pending.
    ///
    /// The callback stays posted when it reports more work or fails, matching
    /// a message loop that re-posts before rethrowing.
    pub(crate) fn invoke(
        &self,
        has_time_remaining: bool,
        current_time: Time,
    ) -> Option<Result<bool, SchedulerError>> {
        let mut callback = self.slot.borrow_mut().take()?;
        let generation = self.generation.get();

        let result = callback(has_time_remaining, current_time);

        let keep = !matches!(result, Ok(false));
        if keep && self.generation.get() == generation {
            *self.slot.borrow_mut() = Some(callback);
        }
        Some(result)
    }
}

/// Single pending delayed callback with its absolute fire time.
#[derive(Default)]
pub(crate) struct PendingTimeout {
    slot: RefCell<Option<(Time, TimeoutCallback)>>,
}

impl PendingTimeout {
    pub(crate) fn set(
        &self,
        fire_at: Time,
        callback: TimeoutCallback,
    ) {
        let old = self.slot.borrow_mut().replace((fire_at, callback));
        drop(old);
    }

    pub(crate) fn clear(&self) {
        let old = self.slot.borrow_mut().take();
        drop(old);
    }

    pub(crate) fn fire_at(&self) -> Option<Time> {
        self.slot.borrow().as_ref().map(|(at, _)| *at)
    }

    /// Fire the timeout if it is due at `now`. Returns whether it fired.
    pub(crate) fn fire_if_due(
        &self,
        now: Time,
    ) -> bool {
        let due = matches!(self.fire_at(), Some(at) if at <= now);
        if !due {
            return false;
        }
        let taken = self.slot.borrow_mut().take();
        match taken {
            Some((_, callback)) => {
                callback(now);
                true
            }
            None => false,
        }
    }
}
