//! Local Task Queue
//!
//! A single FIFO of [`SwarmTask`]s. Handlers and tasks enqueue; exactly one
//! drain loop dequeues, so tasks run strictly one after another.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::SwarmTask;

#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<SwarmTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, VecDeque<SwarmTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, task: SwarmTask) {
        tracing::debug!(task_id = task.id(), kind = task.kind(), "Enqueued task");
        self.tasks().push_back(task);
    }

    pub fn try_dequeue(&self) -> Option<SwarmTask> {
        self.tasks().pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Ids of queued tasks, front first.
    pub fn pending_ids(&self) -> Vec<String> {
        self.tasks().iter().map(|t| t.id().to_string()).collect()
    }
}
