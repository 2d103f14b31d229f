use serde::{Deserialize, Serialize};

use crate::error::{FlowdError, Result};

/// Lifecycle of a submitted task.
///
/// Transitions are strictly forward: `Pending -> Started -> Finished`.
/// Anything else is a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Started,
    Finished,
}

impl TaskState {
    /// Validate a transition, returning the new state.
    pub fn transition(self, next: TaskState) -> Result<TaskState> {
        match (self, next) {
            (TaskState::Pending, TaskState::Started)
            | (TaskState::Started, TaskState::Finished) => Ok(next),
            (from, to) => Err(FlowdError::IllegalState { from, to }),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Finished)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Started => write!(f, "started"),
            TaskState::Finished => write!(f, "finished"),
        }
    }
}
