//! Priority work queue for apartments
//!
//! One FIFO per priority level; higher levels are served first.

use std::collections::VecDeque;

use super::Work;
use crate::runtime::priority::Priority;

/// Priority-aware work queue.
///
/// Not synchronized on its own; the owning apartment guards it.
#[derive(Default)]
pub struct PriorityWorkQueue {
    levels: [VecDeque<Work>; Priority::LEVELS],
}

impl PriorityWorkQueue {
    /// Create an empty queue.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push work at the given priority.
    #[inline]
    pub fn push(
        &mut self,
        work: Work,
        priority: Priority,
    ) {
        self.levels[priority.queue_index()].push_back(work);
    }

    /// Pop the oldest work of the highest non-empty level.
    pub fn pop(&mut self) -> Option<Work> {
        self.levels.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Total queued work items.
    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(VecDeque::is_empty)
    }
}

impl std::fmt::Debug for PriorityWorkQueue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PriorityWorkQueue")
            .field("len", &self.len())
            .finish()
    }
}
