//! Array-backed binary min-heap used by both scheduler queues.
//!
//! Nodes are ordered by `(sort_index, id)`. The heap has no arbitrary
//! removal: cancelled nodes stay in place until they reach the top and are
//! popped by the scheduler.

use std::cmp::Ordering;
use std::rc::Rc;

use super::Time;

/// A node that can live in a [`PriorityHeap`].
///
/// `sort_index` must not change while the node is inside a heap.
pub trait HeapNode {
    /// Primary ordering key.
    fn sort_index(&self) -> Time;

    /// Tie-breaker, unique per node.
    fn node_id(&self) -> u64;
}

impl<T: HeapNode + ?Sized> HeapNode for Rc<T> {
    #[inline]
    fn sort_index(&self) -> Time {
        (**self).sort_index()
    }

    #[inline]
    fn node_id(&self) -> u64 {
        (**self).node_id()
    }
}

#[inline]
fn compare<T: HeapNode>(
    a: &T,
    b: &T,
) -> Ordering {
    a.sort_index()
        .total_cmp(&b.sort_index())
        .then_with(|| a.node_id().cmp(&b.node_id()))
}

/// Binary min-heap keyed by `(sort_index, id)`.
#[derive(Debug, Clone)]
pub struct PriorityHeap<T> {
    nodes: Vec<T>,
}

impl<T: HeapNode> PriorityHeap<T> {
    /// Create an empty heap.
    #[inline]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Create an empty heap with room for `capacity` nodes.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Insert a node.
    pub fn push(
        &mut self,
        node: T,
    ) {
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        self.sift_up(last);
    }

    /// The minimum node, if any.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    /// Remove and return the minimum node. Returns `None` on an empty heap.
    pub fn pop(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        let first = self.nodes.swap_remove(0);
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        Some(first)
    }

    /// Number of nodes, including cancelled ones not yet popped.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate nodes in heap (not sorted) order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.nodes.iter()
    }

    fn sift_up(
        &mut self,
        mut index: usize,
    ) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if compare(&self.nodes[parent], &self.nodes[index]) == Ordering::Greater {
                self.nodes.swap(parent, index);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(
        &mut self,
        mut index: usize,
    ) {
        let len = self.nodes.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && compare(&self.nodes[left], &self.nodes[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < len && compare(&self.nodes[right], &self.nodes[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.nodes.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T: HeapNode> Default for PriorityHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
