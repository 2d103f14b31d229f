use std::sync::{Arc, Condvar, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::tasks::{Invoker, Task, TaskOutcome, TaskState};

/// A resolved unit of work: the task to run plus the arguments recorded at
/// submission time.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub task: Arc<Task>,
    pub invoker: Invoker,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl TaskInvocation {
    pub fn new(task: Arc<Task>, invoker: Invoker) -> Self {
        Self {
            task,
            invoker,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn run(&self) -> TaskOutcome {
        self.task.invoke(&self.invoker, &self.args, &self.kwargs)
    }
}

type DoneCallback = Box<dyn FnOnce(&TaskOutcome) + Send>;

struct FutureInner {
    state: TaskState,
    result: Option<TaskOutcome>,
    callbacks: Vec<DoneCallback>,
}

/// Single-assignment result cell for one submitted invocation.
///
/// The state machine is strictly `Pending -> Started -> Finished`; the
/// result slot is written exactly once, at `Finished`. Completion callbacks
/// fire in registration order; a callback registered after completion runs
/// immediately.
pub struct TaskFuture {
    id: Uuid,
    submitted_at: DateTime<Utc>,
    invocation: TaskInvocation,
    inner: Mutex<FutureInner>,
    done: Condvar,
}

impl TaskFuture {
    pub fn new(invocation: TaskInvocation) -> Self {
        Self {
            id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            invocation,
            inner: Mutex::new(FutureInner {
                state: TaskState::Pending,
                result: None,
                callbacks: Vec::new(),
            }),
            done: Condvar::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn invocation(&self) -> &TaskInvocation {
        &self.invocation
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().expect("future poisoned").state
    }

    /// Move the future to `Started`. Called by the executor just before the
    /// task function runs.
    pub fn mark_started(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("future poisoned");
        inner.state = inner.state.transition(TaskState::Started)?;
        Ok(())
    }

    /// Move the future to `Finished`, store the result, and fire every
    /// completion callback in registration order.
    pub fn complete(&self, outcome: TaskOutcome) -> Result<()> {
        let callbacks = {
            let mut inner = self.inner.lock().expect("future poisoned");
            inner.state = inner.state.transition(TaskState::Finished)?;
            inner.result = Some(outcome.clone());
            self.done.notify_all();
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback(&outcome);
        }
        Ok(())
    }

    /// Register a completion callback. Runs immediately when the future has
    /// already finished.
    pub fn on_done(&self, callback: impl FnOnce(&TaskOutcome) + Send + 'static) {
        let ready = {
            let mut inner = self.inner.lock().expect("future poisoned");
            if inner.state.is_finished() {
                inner.result.clone()
            } else {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        };
        if let Some(outcome) = ready {
            callback(&outcome);
        }
    }

    /// Fetch the result. With `wait` set, blocks the calling thread until
    /// the future finishes; otherwise returns `None` while unfinished.
    pub fn get(&self, wait: bool) -> Option<TaskOutcome> {
        let mut inner = self.inner.lock().expect("future poisoned");
        if wait {
            while !inner.state.is_finished() {
                inner = self.done.wait(inner).expect("future poisoned");
            }
        }
        inner.result.clone()
    }

    /// Block until the result is available.
    pub fn wait(&self) -> TaskOutcome {
        self.get(true).expect("finished future always has a result")
    }
}

impl std::fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("id", &self.id)
            .field("task", &self.invocation.task.name())
            .field("state", &self.state())
            .finish()
    }
}
