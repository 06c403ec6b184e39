//! Message-loop host integration tests
//!
//! These run on the real clock, so they only assert orderings and lower
//! bounds on elapsed time.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use timeslice::{
    HostBridge, HostConfig, MessageLoopHost, PriorityLevel, Scheduler, TaskOptions, TaskStatus,
};

#[test]
fn test_run_drains_everything() {
    let host = Rc::new(MessageLoopHost::new());
    let scheduler = Scheduler::new(host.clone());
    let log = Rc::new(RefCell::new(Vec::new()));

    for (name, level) in [
        ("idle", PriorityLevel::Idle),
        ("normal", PriorityLevel::Normal),
        ("immediate", PriorityLevel::Immediate),
    ] {
        let log = log.clone();
        scheduler.schedule_task(level, move |_| {
            log.borrow_mut().push(name);
            Ok(TaskStatus::Done)
        });
    }

    host.run().unwrap();
    assert_eq!(*log.borrow(), ["immediate", "normal", "idle"]);
    assert!(!host.has_pending_work());
}

#[test]
fn test_run_sleeps_until_delayed_task() {
    let host = Rc::new(MessageLoopHost::new());
    let scheduler = Scheduler::new(host.clone());
    let ran_at = Rc::new(Cell::new(None));

    let submitted = host.now();
    {
        let ran_at = ran_at.clone();
        let s = scheduler.clone();
        scheduler.schedule_task_with_options(
            PriorityLevel::Normal,
            move |_| {
                ran_at.set(Some(s.now()));
                Ok(TaskStatus::Done)
            },
            TaskOptions::delayed(15.0),
        );
    }

    host.run().unwrap();
    let ran_at = ran_at.get().unwrap();
    assert!(ran_at - submitted >= 15.0);
    assert_eq!(scheduler.timer_queue_len(), 0);
}

#[test]
fn test_busy_tasks_span_several_slices() {
    let host = Rc::new(MessageLoopHost::new());
    let scheduler = Scheduler::new(host.clone());
    let slices = Rc::new(Cell::new(0));

    // Count passes by watching `should_yield` flip to true between tasks.
    for _ in 0..6 {
        let s = scheduler.clone();
        let slices = slices.clone();
        scheduler.schedule_task(PriorityLevel::Normal, move |_| {
            let start = s.now();
            while s.now() - start < 3.0 {
                std::hint::spin_loop();
            }
            if s.should_yield() {
                slices.set(slices.get() + 1);
            }
            Ok(TaskStatus::Done)
        });
    }

    host.run().unwrap();
    assert!(slices.get() >= 2);
    assert_eq!(scheduler.task_queue_len(), 0);
}

#[test]
fn test_input_probe_keeps_slice_open() {
    let config = HostConfig {
        yield_interval_ms: 1.0,
        max_yield_interval_ms: 10_000.0,
        assume_time_remaining: true,
    };
    let host = Rc::new(MessageLoopHost::with_config(config));
    host.set_input_pending_probe(|| false);
    let scheduler = Scheduler::new(host.clone());
    let yielded = Rc::new(Cell::new(false));

    {
        let s = scheduler.clone();
        let yielded = yielded.clone();
        scheduler.schedule_task(PriorityLevel::Normal, move |_| {
            let start = s.now();
            while s.now() - start < 3.0 {
                std::hint::spin_loop();
            }
            // Past the 1 ms deadline, but no input and no paint pending.
            yielded.set(s.should_yield());
            s.request_paint();
            Ok(TaskStatus::Done)
        });
    }
    {
        let s = scheduler.clone();
        let yielded = yielded.clone();
        scheduler.schedule_task(PriorityLevel::Normal, move |_| {
            // A paint was requested, and it was granted between slices.
            yielded.set(yielded.get() || s.should_yield());
            Ok(TaskStatus::Done)
        });
    }

    host.run().unwrap();
    assert!(!yielded.get());
}

#[test]
fn test_cancelled_far_future_timer_lets_run_return() {
    let host = Rc::new(MessageLoopHost::new());
    let scheduler = Scheduler::new(host.clone());

    for delay in [1.0e25, f64::INFINITY] {
        let task = scheduler.schedule_task_with_options(
            PriorityLevel::Low,
            |_| Ok(TaskStatus::Done),
            TaskOptions::delayed(delay),
        );
        assert!(host.has_pending_work());
        scheduler.cancel_task(&task);
    }

    host.run().unwrap();
    assert!(!host.has_pending_work());
    assert_eq!(scheduler.timer_queue_len(), 0);
}
