use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;

use crate::command::Command;
use crate::error::{FlowdError, Result};
use crate::exec::LocalExecutor;
use crate::tasks::{Task, TaskError};

/// Name -> task lookup used at the dispatch boundary.
///
/// The wire protocol ships task names, not code; a request naming a task
/// that was never registered is a protocol-level error.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the builtin tasks: `echo` (returns its
    /// arguments) and `shell` (runs a local command).
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(echo_task()));
        registry.register(Arc::new(shell_task()));
        registry
    }

    /// Register a task under its own name, replacing any previous holder.
    pub fn register(&self, task: Arc<Task>) {
        self.tasks
            .write()
            .expect("task registry poisoned")
            .insert(task.name().to_string(), task);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks
            .read()
            .expect("task registry poisoned")
            .get(name)
            .cloned()
    }

    /// Resolve a task name, failing with `UnknownTask` when unregistered.
    pub fn lookup(&self, name: &str) -> Result<Arc<Task>> {
        self.get(name)
            .ok_or_else(|| FlowdError::UnknownTask(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .read()
            .expect("task registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `echo`: returns its positional arguments unchanged.
fn echo_task() -> Task {
    Task::new("echo", |_meta, _invoker, args, _kwargs| {
        Ok(Value::Array(args.to_vec()))
    })
}

/// `shell`: runs `args[0]` via `sh -c` on the executing worker.
///
/// Recognized kwargs: `env` (string map) and `timeout_ms` (number). The
/// result is the command's output with stderr taking priority.
fn shell_task() -> Task {
    Task::new("shell", |_meta, invoker, args, kwargs| {
        let cmd = args
            .first()
            .and_then(Value::as_str)
            .ok_or(TaskError::new("shell requires a command string argument"))?;

        let mut command = Command::new(cmd);
        if let Some(env) = kwargs.get("env").and_then(Value::as_object) {
            for (key, value) in env {
                let value = value
                    .as_str()
                    .ok_or(TaskError::new("shell env values must be strings"))?;
                command = command.with_env(key, value);
            }
        }
        if let Some(timeout_ms) = kwargs.get("timeout_ms").and_then(Value::as_u64) {
            command = command.with_timeout(Duration::from_millis(timeout_ms));
        }

        let executor = LocalExecutor::new(invoker.name.clone());
        let response = executor
            .run(&command)
            .map_err(|err| TaskError::new(err.to_string()))?;
        Ok(Value::String(
            String::from_utf8_lossy(response.result()).into_owned(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Invoker;
    use crate::tasks::TaskOutcome;
    use serde_json::{json, Map};

    #[test]
    fn lookup_of_unknown_task_fails() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.lookup("missing"),
            Err(FlowdError::UnknownTask(_))
        ));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["echo", "shell"]);
    }

    #[test]
    fn registering_replaces_previous_holder() {
        let registry = TaskRegistry::new();
        registry.register(Arc::new(Task::new("t", |_m, _i, _a, _k| Ok(json!(1)))));
        registry.register(Arc::new(Task::new("t", |_m, _i, _a, _k| Ok(json!(2)))));
        assert_eq!(registry.len(), 1);

        let task = registry.lookup("t").unwrap();
        let outcome = task.invoke(&Invoker::local("test"), &[], &Map::new());
        assert_eq!(outcome, TaskOutcome::Success(json!(2)));
    }

    #[test]
    fn echo_returns_its_arguments() {
        let registry = TaskRegistry::with_builtins();
        let task = registry.lookup("echo").unwrap();
        let outcome = task.invoke(&Invoker::local("test"), &[json!("hi"), json!(2)], &Map::new());
        assert_eq!(outcome, TaskOutcome::Success(json!(["hi", 2])));
    }

    #[test]
    fn shell_runs_a_command() {
        let registry = TaskRegistry::with_builtins();
        let task = registry.lookup("shell").unwrap();
        let outcome = task.invoke(&Invoker::local("test"), &[json!("echo hi")], &Map::new());
        assert_eq!(outcome, TaskOutcome::Success(json!("hi\n")));
    }

    #[test]
    fn shell_without_command_fails() {
        let registry = TaskRegistry::with_builtins();
        let task = registry.lookup("shell").unwrap();
        let outcome = task.invoke(&Invoker::local("test"), &[], &Map::new());
        assert!(!outcome.is_success());
    }
}
