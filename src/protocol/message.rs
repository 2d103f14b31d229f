use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::tasks::TaskOutcome;

/// A remote-callable task descriptor: the registered task to invoke plus
/// its positional and keyword arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// The result payload written back on the submitting connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn from_outcome(outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success(value) => Self::success(value.clone()),
            TaskOutcome::Failure(error) => Self::failure(error.clone()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_missing_args() {
        let req = TaskRequest::from_bytes(br#"{"task":"echo"}"#).unwrap();
        assert_eq!(req.task, "echo");
        assert!(req.args.is_empty());
        assert!(req.kwargs.is_empty());
    }

    #[test]
    fn request_builder_accumulates_arguments() {
        let req = TaskRequest::new("shell")
            .with_arg(json!("echo hi"))
            .with_kwarg("timeout_ms", json!(500));
        assert_eq!(req.args, vec![json!("echo hi")]);
        assert_eq!(req.kwargs.get("timeout_ms"), Some(&json!(500)));
    }

    #[test]
    fn response_reflects_outcome() {
        let ok = TaskResponse::from_outcome(&TaskOutcome::Success(json!([1, 2])));
        assert!(ok.ok);
        assert_eq!(ok.result, Some(json!([1, 2])));
        assert!(ok.error.is_none());

        let err = TaskResponse::from_outcome(&TaskOutcome::Failure("boom".into()));
        assert!(!err.ok);
        assert!(err.result.is_none());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn undecodable_request_is_an_error() {
        assert!(TaskRequest::from_bytes(b"not json").is_err());
    }
}
