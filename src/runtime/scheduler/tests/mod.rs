//! Scheduler unit tests
//!
//! Everything runs on a [`VirtualHost`], so time only moves when a test (or a
//! task standing in for real work) advances it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::runtime::host::VirtualHost;
use crate::runtime::scheduler::{
    Callback, PriorityLevel, Scheduler, SchedulerConfig, Task, TaskId, TaskIdGenerator,
    TaskStatus,
};


pub(super) type Log = Rc<RefCell<Vec<String>>>;

pub(super) fn setup() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler)
}

pub(super) fn setup_profiled() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let config = SchedulerConfig {
        enable_profiling: true,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::with_config(host.clone(), config);
    (host, scheduler)
}

pub(super) fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Callback that records `name` and finishes.
pub(super) fn logging(
    log: &Log,
    name: &str,
) -> impl FnOnce(bool) -> anyhow::Result<TaskStatus> + 'static {
    let log = log.clone();
    let name = name.to_string();
    move |_| {
        log.borrow_mut().push(name);
        Ok(TaskStatus::Done)
    }
}

/// Callback that counts its invocations, burns `cost` ms of virtual time per
/// step and yields a continuation `remaining` more times.
pub(super) fn counting_steps(
    calls: Rc<Cell<u32>>,
    host: Rc<VirtualHost>,
    cost: f64,
    remaining: u32,
) -> Callback {
    Box::new(move |_| {
        calls.set(calls.get() + 1);
        host.advance_time(cost);
        if remaining == 0 {
            Ok(TaskStatus::Done)
        } else {
            Ok(TaskStatus::Continue(counting_steps(
                calls,
                host,
                cost,
                remaining - 1,
            )))
        }
    })
}

#[cfg(test)]
mod priority_tests {
    use super::*;
    use crate::runtime::scheduler::priority::MAX_SIGNED_31_BIT_INT;
    use crate::runtime::scheduler::timeout_for_priority;

    #[test]
    fn test_timeouts() {
        assert_eq!(timeout_for_priority(PriorityLevel::Immediate), -1.0);
        assert_eq!(timeout_for_priority(PriorityLevel::UserBlocking), 250.0);
        assert_eq!(timeout_for_priority(PriorityLevel::Normal), 5000.0);
        assert_eq!(timeout_for_priority(PriorityLevel::Low), 10000.0);
        assert_eq!(
            timeout_for_priority(PriorityLevel::Idle),
            MAX_SIGNED_31_BIT_INT
        );
    }

    #[test]
    fn test_numeric_levels() {
        for level in PriorityLevel::ALL {
            assert_eq!(PriorityLevel::from_u8(level.as_u8()), level);
        }
        assert_eq!(PriorityLevel::from_u8(0), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::from_u8(42), PriorityLevel::Normal);
    }

    #[test]
    fn test_ordering() {
        assert!(PriorityLevel::Immediate < PriorityLevel::UserBlocking);
        assert!(PriorityLevel::UserBlocking < PriorityLevel::Normal);
        assert!(PriorityLevel::Normal < PriorityLevel::Low);
        assert!(PriorityLevel::Low < PriorityLevel::Idle);
        assert_eq!(PriorityLevel::default(), PriorityLevel::Normal);
    }

    #[test]
    fn test_next_level() {
        assert_eq!(PriorityLevel::Immediate.next_level(), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::UserBlocking.next_level(), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::Normal.next_level(), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::Low.next_level(), PriorityLevel::Low);
        assert_eq!(PriorityLevel::Idle.next_level(), PriorityLevel::Idle);
    }

    #[test]
    fn test_display() {
        assert_eq!(PriorityLevel::UserBlocking.to_string(), "user-blocking");
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    fn noop() -> Callback {
        Box::new(|_| Ok(TaskStatus::Done))
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(3).to_string(), "Task(3)");
        assert_eq!(u64::from(TaskId(9)), 9);
    }

    #[test]
    fn test_id_generator_starts_at_one() {
        let mut ids = TaskIdGenerator::new();
        assert_eq!(ids.next(), TaskId(1));
        assert_eq!(ids.next(), TaskId(2));
    }

    #[test]
    fn test_expiration_time() {
        let task = Task::new(TaskId(1), PriorityLevel::UserBlocking, 100.0, noop());
        assert_eq!(task.start_time(), 100.0);
        assert_eq!(task.expiration_time(), 350.0);

        let immediate = Task::new(TaskId(2), PriorityLevel::Immediate, 100.0, noop());
        assert_eq!(immediate.expiration_time(), 99.0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let task = Task::new(TaskId(1), PriorityLevel::Normal, 0.0, noop());
        assert!(task.has_callback());
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());
        assert!(!task.has_callback());
    }

    #[test]
    fn test_task_debug() {
        let task = Task::new(TaskId(1), PriorityLevel::Low, 0.0, noop());
        let debug = format!("{:?}", task);
        assert!(debug.contains("Task"));
        assert!(debug.contains("Low"));
    }

    #[test]
    fn test_task_status() {
        assert!(TaskStatus::Done.is_done());
        let status = TaskStatus::continue_with(|_| Ok(TaskStatus::Done));
        assert!(!status.is_done());
        assert_eq!(format!("{:?}", status), "Continue(..)");
    }
}
