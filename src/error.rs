use thiserror::Error;

use crate::tasks::TaskState;

#[derive(Error, Debug)]
pub enum FlowdError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalState { from: TaskState, to: TaskState },

    #[error("Daemon already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("No running instance")]
    NotRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FlowdError>;
