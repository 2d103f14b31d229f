//! Local command execution for the `shell` builtin task.
//!
//! Runs synchronously: task functions execute on the worker's dedicated
//! thread, never on the async runtime.

use std::io::Read;
use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::command::{Command, Response};
use crate::error::{FlowdError, Result};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Executes [`Command`]s as local shell children, capturing their output.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    target: String,
}

impl LocalExecutor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Run a command to completion via `sh -c`, enforcing its timeout.
    pub fn run(&self, command: &Command) -> Result<Response> {
        tracing::debug!(target = %self.target, cmd = %command.cmd, "Executing command");

        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command.cmd)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain the pipes on their own threads so a chatty child cannot
        // deadlock against a full pipe buffer while we wait on it.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = std::thread::spawn(move || read_all(stdout));
        let stderr_reader = std::thread::spawn(move || read_all(stderr));

        let deadline = command.timeout.map(|t| Instant::now() + t);
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    child.kill().ok();
                    child.wait().ok();
                    stdout_reader.join().ok();
                    stderr_reader.join().ok();
                    return Err(FlowdError::Internal(format!(
                        "command timed out after {:?}: {}",
                        command.timeout.unwrap_or_default(),
                        command.cmd
                    )));
                }
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }

        let stdout = stdout_reader
            .join()
            .map_err(|_| FlowdError::Internal("stdout reader panicked".to_string()))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| FlowdError::Internal("stderr reader panicked".to_string()))?;

        Ok(Response::new(self.target.clone(), stdout, stderr))
    }
}

fn read_all(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).ok();
    }
    buf
}
