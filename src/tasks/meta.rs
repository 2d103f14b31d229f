use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tasks::Task;

/// Per-invocation scratch data for a task.
///
/// A fresh bag is built for every call. The configured predecessor is held
/// as an explicit field; everything else goes through `get`/`set`.
#[derive(Debug, Clone, Default)]
pub struct TaskMeta {
    run_after: Option<Arc<Task>>,
    values: HashMap<String, Value>,
}

impl TaskMeta {
    pub fn new(run_after: Option<Arc<Task>>) -> Self {
        Self {
            run_after,
            values: HashMap::new(),
        }
    }

    /// The predecessor this invocation waited on, if any.
    pub fn run_after(&self) -> Option<&Arc<Task>> {
        self.run_after.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_set_roundtrip() {
        let mut meta = TaskMeta::new(None);
        assert!(meta.get("attempt").is_none());
        meta.set("attempt", json!(1));
        assert_eq!(meta.get("attempt"), Some(&json!(1)));
        assert!(meta.contains("attempt"));
        assert_eq!(meta.remove("attempt"), Some(json!(1)));
        assert!(meta.is_empty());
    }

    #[test]
    fn fresh_meta_has_no_predecessor() {
        let meta = TaskMeta::new(None);
        assert!(meta.run_after().is_none());
    }
}
