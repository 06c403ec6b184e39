//! Delayed task integration tests

use std::cell::RefCell;
use std::rc::Rc;

use timeslice::{HostBridge, PriorityLevel, Scheduler, TaskOptions, TaskStatus, Time, VirtualHost};

fn setup() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler)
}

/// Schedule a delayed task that records the time it ran at.
fn delayed(
    scheduler: &Scheduler,
    runs: &Rc<RefCell<Vec<(&'static str, Time)>>>,
    name: &'static str,
    level: PriorityLevel,
    delay: Time,
) -> timeslice::TaskHandle {
    let runs = runs.clone();
    let s = scheduler.clone();
    scheduler.schedule_task_with_options(
        level,
        move |_| {
            runs.borrow_mut().push((name, s.now()));
            Ok(TaskStatus::Done)
        },
        TaskOptions::delayed(delay),
    )
}

#[test]
fn test_delayed_task_moves_to_task_queue_when_due() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    let task = delayed(&scheduler, &runs, "D", PriorityLevel::Normal, 100.0);
    assert_eq!(scheduler.task_queue_len(), 0);
    assert!(scheduler.is_in_timer_queue(&task));
    assert_eq!(task.start_time(), 100.0);
    assert_eq!(task.expiration_time(), 5100.0);

    host.advance_time(99.0);
    host.flush_expired().unwrap();
    assert!(runs.borrow().is_empty());

    host.advance_time(1.0);
    assert!(host.fire_due_timeout());
    assert!(scheduler.is_in_task_queue(&task));
    assert_eq!(task.sort_index(), 5100.0);

    host.flush_all().unwrap();
    assert_eq!(*runs.borrow(), [("D", 100.0)]);
}

#[test]
fn test_timers_fire_in_start_order() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    delayed(&scheduler, &runs, "late", PriorityLevel::Immediate, 300.0);
    delayed(&scheduler, &runs, "early", PriorityLevel::Idle, 10.0);
    delayed(&scheduler, &runs, "middle", PriorityLevel::Normal, 120.0);

    host.flush_all().unwrap();
    assert_eq!(
        *runs.borrow(),
        [("early", 10.0), ("middle", 120.0), ("late", 300.0)]
    );
    assert_eq!(scheduler.timer_queue_len(), 0);
    assert_eq!(host.pending_timeout_at(), None);
}

#[test]
fn test_timers_due_together_run_by_deadline() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    delayed(&scheduler, &runs, "idle", PriorityLevel::Idle, 50.0);
    delayed(&scheduler, &runs, "blocking", PriorityLevel::UserBlocking, 50.0);

    host.advance_time(60.0);
    host.flush_expired().unwrap();
    assert_eq!(*runs.borrow(), [("blocking", 60.0), ("idle", 60.0)]);
}

#[test]
fn test_cancelled_timer_never_runs() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    let first = delayed(&scheduler, &runs, "first", PriorityLevel::Normal, 10.0);
    delayed(&scheduler, &runs, "second", PriorityLevel::Normal, 20.0);
    scheduler.cancel_task(&first);

    host.flush_all().unwrap();
    assert_eq!(*runs.borrow(), [("second", 20.0)]);
}

#[test]
fn test_task_schedules_delayed_follow_up() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    {
        let s = scheduler.clone();
        let runs = runs.clone();
        scheduler.schedule_task(PriorityLevel::Normal, move |_| {
            delayed(&s, &runs, "follow-up", PriorityLevel::Low, 25.0);
            Ok(TaskStatus::Done)
        });
    }

    host.flush_step().unwrap();
    assert_eq!(host.pending_timeout_at(), Some(25.0));

    host.flush_all().unwrap();
    assert_eq!(*runs.borrow(), [("follow-up", 25.0)]);
}

#[test]
fn test_long_task_promotes_due_timer() {
    let (host, scheduler) = setup();
    let runs = Rc::new(RefCell::new(Vec::new()));

    delayed(&scheduler, &runs, "timer", PriorityLevel::Immediate, 5.0);
    {
        let host = host.clone();
        let runs = runs.clone();
        scheduler.schedule_task(PriorityLevel::Normal, move |_| {
            host.advance_time(30.0);
            runs.borrow_mut().push(("long", host.now()));
            Ok(TaskStatus::Done)
        });
    }
    scheduler.schedule_task(PriorityLevel::Normal, |_| Ok(TaskStatus::Done));

    // The slice is used up, but the promoted timer has already expired.
    assert_eq!(host.flush_step().unwrap(), Some(true));
    assert_eq!(*runs.borrow(), [("long", 30.0), ("timer", 30.0)]);
}
