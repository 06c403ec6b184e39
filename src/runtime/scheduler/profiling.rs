//! Task lifecycle profiling.
//!
//! When enabled, the scheduler records one event per lifecycle transition into
//! a bounded ring. Events serialize to JSON for offline inspection.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::priority::PriorityLevel;
use super::task::Task;
use super::Time;

/// Kind of profiling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingEventKind {
    /// Task entered the task queue.
    TaskStart,
    /// Task callback is about to run.
    TaskRun,
    /// Task callback returned a continuation.
    TaskYield,
    /// Task finished.
    TaskComplete,
    /// Queued task was cancelled.
    TaskCancel,
    /// Task callback failed.
    TaskError,
    /// Work loop handed control back to the host.
    SchedulerSuspend,
    /// Host granted a new work-loop pass.
    SchedulerUnsuspend,
}

/// A single profiling record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingEvent {
    pub kind: ProfilingEventKind,
    pub time: Time,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityLevel>,
}

/// Bounded event recorder.
#[derive(Debug)]
pub struct Profiler {
    enabled: bool,
    capacity: usize,
    events: VecDeque<ProfilingEvent>,
    dropped: u64,
}

impl Profiler {
    pub fn new(
        enabled: bool,
        capacity: usize,
    ) -> Self {
        Self {
            enabled,
            capacity: capacity.max(1),
            events: VecDeque::new(),
            dropped: 0,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&mut self) {
        self.enabled = true;
    }

    /// Stop recording. Already recorded events are kept.
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// Number of events evicted because the ring was full.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events(&self) -> impl Iterator<Item = &ProfilingEvent> {
        self.events.iter()
    }

    /// Drain all recorded events.
    pub fn take(&mut self) -> Vec<ProfilingEvent> {
        self.events.drain(..).collect()
    }

    /// Recorded events as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let events: Vec<&ProfilingEvent> = self.events.iter().collect();
        serde_json::to_string_pretty(&events)
    }

    pub(crate) fn task_event(
        &mut self,
        kind: ProfilingEventKind,
        task: &Task,
        time: Time,
    ) {
        self.record(ProfilingEvent {
            kind,
            time,
            task_id: Some(task.id().inner()),
            priority: Some(task.priority_level()),
        });
    }

    pub(crate) fn scheduler_event(
        &mut self,
        kind: ProfilingEventKind,
        time: Time,
    ) {
        self.record(ProfilingEvent {
            kind,
            time,
            task_id: None,
            priority: None,
        });
    }

    fn record(
        &mut self,
        event: ProfilingEvent,
    ) {
        if !self.enabled {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }
}
