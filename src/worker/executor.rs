use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::Result;
use crate::tasks::{TaskFuture, TaskInvocation};
use crate::worker::queue::{QueueEntry, TaskQueue};

/// Single-consumer task execution engine.
///
/// Submissions are wrapped in a [`TaskFuture`] and enqueued without
/// blocking; one dedicated thread drains the queue in strict FIFO order.
/// Single-consumer execution is what makes result routing lock-free: each
/// future's completion callback captures exactly the connection that
/// submitted it.
#[derive(Clone)]
pub struct Worker {
    name: String,
    queue: Arc<TaskQueue>,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(TaskQueue::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap an invocation in a fresh future and enqueue it. Never blocks.
    pub fn add_task(&self, invocation: TaskInvocation) -> Arc<TaskFuture> {
        let future = Arc::new(TaskFuture::new(invocation));
        self.queue.push(QueueEntry::Run(future.clone()));
        future
    }

    /// Start the dedicated execution thread.
    pub fn spawn_executor(&self) -> Result<JoinHandle<()>> {
        let queue = self.queue.clone();
        let name = self.name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{name}-exec"))
            .spawn(move || drain(&queue, &name))?;
        Ok(handle)
    }

    /// Discard all queued entries, then ask the consumer to exit.
    ///
    /// Cooperative: a task the consumer has already dequeued runs to
    /// completion.
    pub fn stop(&self) {
        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::debug!(worker = %self.name, discarded, "Discarded queued tasks on stop");
        }
        self.queue.push(QueueEntry::Stop);
    }

    /// Current queue depth; approximate under concurrent submission.
    pub fn task_count(&self) -> usize {
        self.queue.len()
    }
}

fn drain(queue: &TaskQueue, worker: &str) {
    tracing::debug!(worker, "Execution thread started");
    loop {
        match queue.pop() {
            QueueEntry::Stop => break,
            QueueEntry::Run(future) => execute(&future, worker),
        }
    }
    tracing::debug!(worker, "Execution thread exiting");
}

fn execute(future: &TaskFuture, worker: &str) {
    if let Err(err) = future.mark_started() {
        tracing::error!(worker, future = %future.id(), error = %err, "Refusing to run future");
        return;
    }
    let outcome = future.invocation().run();
    tracing::debug!(
        worker,
        future = %future.id(),
        task = future.invocation().task.name(),
        success = outcome.is_success(),
        "Task finished"
    );
    if let Err(err) = future.complete(outcome) {
        tracing::error!(worker, future = %future.id(), error = %err, "Failed to complete future");
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("queued", &self.task_count())
            .finish()
    }
}
