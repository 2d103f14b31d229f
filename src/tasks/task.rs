use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::signal::{Gate, Signal, Trigger};
use crate::tasks::TaskMeta;

/// Failure reported by a task function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Tagged result of one task invocation. Failures are values, never
/// unwinds; this is what keeps the queue consumer alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

/// Who is invoking a task: the executing worker, and the submitting peer
/// when the invocation came in over the wire.
#[derive(Debug, Clone)]
pub struct Invoker {
    pub name: String,
    pub peer: Option<SocketAddr>,
}

impl Invoker {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

/// Run condition attached to a task: a literal, or a predicate evaluated
/// at invocation time.
#[derive(Clone)]
pub enum RunCondition {
    Literal(bool),
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl RunCondition {
    fn evaluate(&self) -> bool {
        match self {
            RunCondition::Literal(value) => *value,
            RunCondition::Predicate(pred) => pred(),
        }
    }
}

impl std::fmt::Debug for RunCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunCondition::Literal(value) => write!(f, "Literal({value})"),
            RunCondition::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

pub type TaskFn = Arc<
    dyn Fn(&mut TaskMeta, &Invoker, &[Value], &Map<String, Value>) -> Result<Value, TaskError>
        + Send
        + Sync,
>;

/// A named, dependency-aware callable.
///
/// Wraps a function with an optional predecessor edge (`run_after`), an
/// optional run condition (`run_only`), three lifecycle signals, and an
/// unconditional completion [`Trigger`]. Constructed once; invoked any
/// number of times, each invocation getting a fresh [`TaskMeta`].
pub struct Task {
    name: String,
    func: TaskFn,
    run_after: Option<Arc<Task>>,
    run_only: Option<RunCondition>,
    pub on_start: Signal<TaskMeta>,
    pub on_complete: Signal<TaskMeta>,
    pub on_error: Signal<TaskError>,
    pub trigger: Trigger,
    gate: Arc<Gate>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut TaskMeta, &Invoker, &[Value], &Map<String, Value>) -> Result<Value, TaskError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        let name = name.into();
        let on_error = {
            let name = name.clone();
            Signal::from_fn(move |err: &TaskError| {
                tracing::error!(task = %name, error = %err, "Task failed");
            })
        };
        Self {
            name,
            func: Arc::new(func),
            run_after: None,
            run_only: None,
            on_start: Signal::new(),
            on_complete: Signal::new(),
            on_error,
            trigger: Trigger::new(),
            gate: Arc::new(Gate::new()),
        }
    }

    /// Order this task after `predecessor`: each invocation blocks until the
    /// predecessor finishes one invocation. A two-task edge only; there is
    /// no cycle detection and no transitive scheduling.
    pub fn with_run_after(mut self, predecessor: &Arc<Task>) -> Self {
        let gate = self.gate.clone();
        predecessor
            .trigger
            .add(Arc::new(Signal::from_fn(move |_| gate.set())));
        self.run_after = Some(predecessor.clone());
        self
    }

    pub fn with_run_only(mut self, run: bool) -> Self {
        self.run_only = Some(RunCondition::Literal(run));
        self
    }

    pub fn with_run_only_if(mut self, pred: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.run_only = Some(RunCondition::Predicate(Arc::new(pred)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_after(&self) -> Option<&Arc<Task>> {
        self.run_after.as_ref()
    }

    /// Invoke the wrapped function under the task contract.
    ///
    /// The run condition short-circuits to a failure outcome without side
    /// effects; a configured predecessor blocks the calling thread on the
    /// one-shot gate (reset on consumption). Whatever branch is taken, every
    /// signal on the trigger fires before this returns.
    pub fn invoke(
        &self,
        invoker: &Invoker,
        args: &[Value],
        kwargs: &Map<String, Value>,
    ) -> TaskOutcome {
        let mut meta = TaskMeta::new(self.run_after.clone());
        let outcome = self.invoke_inner(&mut meta, invoker, args, kwargs);
        self.trigger.fire();
        outcome
    }

    fn invoke_inner(
        &self,
        meta: &mut TaskMeta,
        invoker: &Invoker,
        args: &[Value],
        kwargs: &Map<String, Value>,
    ) -> TaskOutcome {
        if let Some(condition) = &self.run_only {
            if !condition.evaluate() {
                return TaskOutcome::Failure("Run condition check failed".to_string());
            }
        }

        if self.run_after.is_some() {
            self.gate.wait();
        }

        self.on_start.send(meta);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            (self.func)(&mut *meta, invoker, args, kwargs)
        }));
        match result {
            Ok(Ok(value)) => {
                self.on_complete.send(meta);
                TaskOutcome::Success(value)
            }
            Ok(Err(err)) => {
                self.on_error.send(&err);
                TaskOutcome::Failure(err.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                let err = TaskError::new(message);
                self.on_error.send(&err);
                TaskOutcome::Failure(err.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("run_after", &self.run_after.as_ref().map(|t| t.name()))
            .field("run_only", &self.run_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoker() -> Invoker {
        Invoker::local("test")
    }

    #[test]
    fn successful_invocation_returns_value() {
        let task = Task::new("double", |_meta, _invoker, args, _kwargs| {
            let n = args[0].as_i64().ok_or(TaskError::new("not a number"))?;
            Ok(json!(n * 2))
        });
        let outcome = task.invoke(&invoker(), &[json!(21)], &Map::new());
        assert_eq!(outcome, TaskOutcome::Success(json!(42)));
    }

    #[test]
    fn task_error_becomes_failure_outcome() {
        let task = Task::new("fails", |_meta, _invoker, _args, _kwargs| {
            Err(TaskError::new("boom"))
        });
        let outcome = task.invoke(&invoker(), &[], &Map::new());
        assert_eq!(outcome, TaskOutcome::Failure("boom".to_string()));
    }

    #[test]
    fn panic_becomes_failure_outcome() {
        let task = Task::new("panics", |_meta, _invoker, _args, _kwargs| {
            panic!("unexpected");
        });
        let outcome = task.invoke(&invoker(), &[], &Map::new());
        assert_eq!(outcome, TaskOutcome::Failure("unexpected".to_string()));
    }

    #[test]
    fn run_only_false_skips_without_side_effects() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_task = ran.clone();
        let task = Task::new("skipped", move |_meta, _invoker, _args, _kwargs| {
            ran_in_task.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .with_run_only(false);

        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_signal = fired.clone();
        task.trigger.add(Arc::new(Signal::from_fn(move |_| {
            fired_in_signal.store(true, Ordering::SeqCst);
        })));

        let outcome = task.invoke(&invoker(), &[], &Map::new());
        assert!(!outcome.is_success());
        assert!(!ran.load(Ordering::SeqCst));
        // The trigger fires even for a skipped invocation.
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn run_only_predicate_is_evaluated_per_invocation() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let allow = Arc::new(AtomicBool::new(false));
        let allow_in_pred = allow.clone();
        let task = Task::new("gated", |_meta, _invoker, _args, _kwargs| Ok(json!("ran")))
            .with_run_only_if(move || allow_in_pred.load(Ordering::SeqCst));

        assert!(!task.invoke(&invoker(), &[], &Map::new()).is_success());
        allow.store(true, Ordering::SeqCst);
        assert!(task.invoke(&invoker(), &[], &Map::new()).is_success());
    }

    #[test]
    fn lifecycle_signals_fire_on_success() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let starts = Arc::new(AtomicUsize::new(0));
        let completes = Arc::new(AtomicUsize::new(0));
        let task = Task::new("observed", |_meta, _invoker, _args, _kwargs| Ok(Value::Null));
        {
            let starts = starts.clone();
            task.on_start.connect(move |_| {
                starts.fetch_add(1, Ordering::SeqCst);
            });
            let completes = completes.clone();
            task.on_complete.connect(move |_| {
                completes.fetch_add(1, Ordering::SeqCst);
            });
        }
        task.invoke(&invoker(), &[], &Map::new());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_after_completion_releases_successor() {
        let first = Arc::new(Task::new("first", |_meta, _invoker, _args, _kwargs| {
            Ok(json!("first"))
        }));
        let second = Task::new("second", |_meta, _invoker, _args, _kwargs| {
            Ok(json!("second"))
        })
        .with_run_after(&first);

        // Predecessor completes before the successor is invoked: the gate is
        // already set, so the successor does not block.
        first.invoke(&invoker(), &[], &Map::new());
        let outcome = second.invoke(&invoker(), &[], &Map::new());
        assert!(outcome.is_success());
    }

    #[test]
    fn run_after_blocks_until_predecessor_runs() {
        let first = Arc::new(Task::new("first", |_meta, _invoker, _args, _kwargs| {
            Ok(Value::Null)
        }));
        let second = Arc::new(
            Task::new("second", |_meta, _invoker, _args, _kwargs| Ok(Value::Null))
                .with_run_after(&first),
        );

        let waiter = {
            let second = second.clone();
            std::thread::spawn(move || second.invoke(&Invoker::local("t"), &[], &Map::new()))
        };
        // Give the successor a moment to reach the gate.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());

        first.invoke(&invoker(), &[], &Map::new());
        assert!(waiter.join().unwrap().is_success());
    }

    #[test]
    fn predecessor_trigger_fires_even_on_failure() {
        let first = Arc::new(Task::new("failing", |_meta, _invoker, _args, _kwargs| {
            Err(TaskError::new("nope"))
        }));
        let second = Task::new("second", |_meta, _invoker, _args, _kwargs| Ok(Value::Null))
            .with_run_after(&first);

        first.invoke(&invoker(), &[], &Map::new());
        // Dependent is released even though the predecessor failed.
        assert!(second.invoke(&invoker(), &[], &Map::new()).is_success());
    }
}
