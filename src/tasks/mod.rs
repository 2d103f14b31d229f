//! The task model: dependency-aware callables and their futures.
//!
//! - [`Task`]: a named function with an optional predecessor edge
//!   (`run_after`), a run condition (`run_only`), lifecycle signals, and an
//!   unconditional completion trigger.
//! - [`TaskFuture`]: the single-assignment result cell a [`crate::worker::Worker`]
//!   hands back on submission.
//! - [`TaskRegistry`]: name -> task resolution for wire requests.
//!
//! # Invocation Flow
//!
//! 1. A fresh [`TaskMeta`] is built for the call
//! 2. The run condition may skip the call (failure outcome, no side effects)
//! 3. A configured predecessor blocks the caller on a one-shot gate
//! 4. `on_start` -> function -> `on_complete` / `on_error`
//! 5. The trigger fires unconditionally, releasing any dependents

pub mod future;
pub mod meta;
pub mod registry;
pub mod state;
pub mod task;

pub use future::{TaskFuture, TaskInvocation};
pub use meta::TaskMeta;
pub use registry::TaskRegistry;
pub use state::TaskState;
pub use task::{Invoker, RunCondition, Task, TaskError, TaskFn, TaskOutcome};
