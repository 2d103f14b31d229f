use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::tasks::TaskFuture;

/// An entry on the execution queue: a future to run, or the sentinel that
/// terminates the consumer loop without representing a task.
pub enum QueueEntry {
    Run(Arc<TaskFuture>),
    Stop,
}

/// Unbounded FIFO drained by exactly one consumer thread.
///
/// Submission never blocks; the consumer blocks when the queue is empty.
#[derive(Default)]
pub struct TaskQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: QueueEntry) {
        self.entries
            .lock()
            .expect("task queue poisoned")
            .push_back(entry);
        self.available.notify_one();
    }

    /// Pop the oldest entry, blocking while the queue is empty.
    pub fn pop(&self) -> QueueEntry {
        let mut entries = self.entries.lock().expect("task queue poisoned");
        loop {
            if let Some(entry) = entries.pop_front() {
                return entry;
            }
            entries = self.available.wait(entries).expect("task queue poisoned");
        }
    }

    /// Discard every queued entry. Returns the number discarded.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().expect("task queue poisoned");
        let discarded = entries.len();
        entries.clear();
        discarded
    }

    /// Current depth; approximate under concurrent submission.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("task queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
