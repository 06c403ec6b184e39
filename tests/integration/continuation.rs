//! Continuation integration tests
//!
//! Long-running work split into steps, interleaved with urgent tasks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use timeslice::runtime::scheduler::Callback;
use timeslice::{HostBridge, PriorityLevel, Scheduler, TaskStatus, VirtualHost};

/// A job that processes `items` one at a time, `cost` ms each, and hands
/// back a continuation whenever the slice runs out.
fn chunked_job(
    scheduler: Scheduler,
    host: Rc<VirtualHost>,
    processed: Rc<Cell<u32>>,
    items: u32,
    cost: f64,
) -> Callback {
    Box::new(move |_| {
        while processed.get() < items {
            host.advance_time(cost);
            processed.set(processed.get() + 1);
            if processed.get() < items && scheduler.should_yield() {
                let next = chunked_job(scheduler.clone(), host.clone(), processed.clone(), items, cost);
                return Ok(TaskStatus::Continue(next));
            }
        }
        Ok(TaskStatus::Done)
    })
}

#[test]
fn test_noop_continuation_twice_then_done() {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    let calls = Rc::new(Cell::new(0));

    fn step(
        calls: Rc<Cell<u32>>,
        host: Rc<VirtualHost>,
    ) -> Callback {
        Box::new(move |_| {
            calls.set(calls.get() + 1);
            // Burn the whole slice so each call lands in its own pass.
            host.advance_time(5.0);
            if calls.get() < 3 {
                Ok(TaskStatus::Continue(step(calls, host)))
            } else {
                Ok(TaskStatus::Done)
            }
        })
    }

    let task = scheduler.schedule_task(PriorityLevel::Normal, step(calls.clone(), host.clone()));

    let mut passes = 0;
    while host.flush_step().unwrap().is_some() {
        passes += 1;
    }
    assert_eq!(passes, 3);
    assert_eq!(calls.get(), 3);
    assert!(!scheduler.is_in_task_queue(&task));
}

#[test]
fn test_chunked_job_yields_between_slices() {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    let processed = Rc::new(Cell::new(0));

    let job = scheduler.schedule_task(
        PriorityLevel::Low,
        chunked_job(scheduler.clone(), host.clone(), processed.clone(), 10, 2.0),
    );

    // 2 ms per item, 5 ms slices: three items per pass.
    assert_eq!(host.flush_step().unwrap(), Some(true));
    assert_eq!(processed.get(), 3);
    assert!(scheduler.is_in_task_queue(&job));

    host.flush_all().unwrap();
    assert_eq!(processed.get(), 10);
    assert_eq!(scheduler.task_queue_len(), 0);
}

#[test]
fn test_urgent_work_interleaves_with_continuation() {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    let processed = Rc::new(Cell::new(0));
    let urgent_at = Rc::new(RefCell::new(None));

    scheduler.schedule_task(
        PriorityLevel::Normal,
        chunked_job(scheduler.clone(), host.clone(), processed.clone(), 9, 2.0),
    );
    assert_eq!(host.flush_step().unwrap(), Some(true));
    assert_eq!(processed.get(), 3);

    // Submitted between passes; runs before the job resumes.
    {
        let processed = processed.clone();
        let urgent_at = urgent_at.clone();
        scheduler.schedule_task(PriorityLevel::UserBlocking, move |_| {
            *urgent_at.borrow_mut() = Some(processed.get());
            Ok(TaskStatus::Done)
        });
    }

    host.flush_all().unwrap();
    assert_eq!(*urgent_at.borrow(), Some(3));
    assert_eq!(processed.get(), 9);
}

#[test]
fn test_continuation_keeps_identity_and_deadline() {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    let processed = Rc::new(Cell::new(0));

    let job = scheduler.schedule_task(
        PriorityLevel::UserBlocking,
        chunked_job(scheduler.clone(), host.clone(), processed.clone(), 6, 2.0),
    );
    let (id, expiration) = (job.id(), job.expiration_time());

    host.flush_step().unwrap();
    let head = scheduler.first_pending_task().unwrap();
    assert_eq!(head.id(), id);
    assert_eq!(head.expiration_time(), expiration);
    assert!(Rc::ptr_eq(&head, &job));
    assert!(host.now() > 0.0);
}
