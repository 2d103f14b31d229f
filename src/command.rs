use std::collections::HashMap;
use std::time::Duration;

/// A shell command plus its execution options.
///
/// This is the shape the remote-execution layer produces; the daemon's
/// `shell` builtin consumes it locally.
#[derive(Debug, Clone)]
pub struct Command {
    pub cmd: String,
    /// Extra environment variables for the child, on top of the inherited
    /// environment.
    pub env: HashMap<String, String>,
    /// Kill the child and fail when it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Command {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            env: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured output of an executed command.
///
/// Stderr takes priority as the result when non-empty.
#[derive(Debug, Clone)]
pub struct Response {
    /// Who executed the command.
    pub target: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Response {
    pub fn new(target: impl Into<String>, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            target: target.into(),
            stdout,
            stderr,
        }
    }

    /// The command's result: stderr when non-empty, stdout otherwise.
    pub fn result(&self) -> &[u8] {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.result()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_wins_when_present() {
        let r = Response::new("local", b"stdout".to_vec(), b"stderr".to_vec());
        assert_eq!(r.result(), b"stderr");
        assert_eq!(r.to_string(), "stderr");
    }

    #[test]
    fn stdout_wins_when_stderr_empty() {
        let r = Response::new("local", b"stdout".to_vec(), Vec::new());
        assert_eq!(r.result(), b"stdout");
        assert_eq!(r.to_string(), "stdout");
    }

    #[test]
    fn command_builder() {
        let cmd = Command::new("echo hi")
            .with_env("KEY", "value")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(cmd.cmd, "echo hi");
        assert_eq!(cmd.env.get("KEY").map(String::as_str), Some("value"));
        assert_eq!(cmd.timeout, Some(Duration::from_secs(5)));
    }
}
