//! Task and timer queues for the scheduler.
//!
//! Both are thin wrappers over [`PriorityHeap`]; the wrapper decides which
//! timestamp a task is keyed by when it enters.

use std::rc::Rc;

use super::heap::PriorityHeap;
use super::task::TaskHandle;

/// Eligible tasks, ordered by expiration time.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: PriorityHeap<TaskHandle>,
}

impl TaskQueue {
    /// Create a new empty task queue.
    #[inline]
    pub fn new() -> Self {
        Self {
            heap: PriorityHeap::new(),
        }
    }

    /// Key the task by its expiration time and insert it.
    #[inline]
    pub fn push(
        &mut self,
        task: TaskHandle,
    ) {
        task.set_sort_index(task.expiration_time());
        self.heap.push(task);
    }

    /// The task with the earliest deadline.
    #[inline]
    pub fn peek(&self) -> Option<&TaskHandle> {
        self.heap.peek()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<TaskHandle> {
        self.heap.pop()
    }

    /// Whether `task` is the current head of the queue.
    #[inline]
    pub fn is_head(
        &self,
        task: &TaskHandle,
    ) -> bool {
        self.heap.peek().is_some_and(|head| Rc::ptr_eq(head, task))
    }

    /// Get the number of tasks in the queue, cancelled ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskHandle> {
        self.heap.iter()
    }
}

/// Delayed tasks, ordered by start time.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: PriorityHeap<TaskHandle>,
}

impl TimerQueue {
    #[inline]
    pub fn new() -> Self {
        Self {
            heap: PriorityHeap::new(),
        }
    }

    /// Key the task by its start time and insert it.
    #[inline]
    pub fn push(
        &mut self,
        task: TaskHandle,
    ) {
        task.set_sort_index(task.start_time());
        self.heap.push(task);
    }

    /// The timer that fires first.
    #[inline]
    pub fn peek(&self) -> Option<&TaskHandle> {
        self.heap.peek()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<TaskHandle> {
        self.heap.pop()
    }

    #[inline]
    pub fn is_head(
        &self,
        task: &TaskHandle,
    ) -> bool {
        self.heap.peek().is_some_and(|head| Rc::ptr_eq(head, task))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskHandle> {
        self.heap.iter()
    }
}
