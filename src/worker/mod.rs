//! Task execution engine: a FIFO queue drained by one dedicated thread.
//!
//! Each job-server process context owns exactly one [`Worker`]. Submitting
//! returns a [`crate::tasks::TaskFuture`] immediately; execution happens on
//! the worker's own thread, in submission order, isolated from network I/O.
//!
//! # Execution Flow
//!
//! 1. [`Worker::add_task`] wraps the invocation in a future and enqueues it
//! 2. The execution thread pops, marks the future started, runs the task
//! 3. The result is stored and completion callbacks fire in order
//! 4. [`Worker::stop`] discards queued entries and enqueues the stop
//!    sentinel; the in-flight task, if any, finishes first

pub mod executor;
pub mod queue;

pub use executor::Worker;
pub use queue::{QueueEntry, TaskQueue};
