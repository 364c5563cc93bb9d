//! Resolved keyword arguments handed to a task function

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Inputs of one task after every reference and path has been resolved
///
/// Path inputs arrive as absolute locator strings, references as the
/// referenced task's value, literals unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    task: String,
    values: BTreeMap<String, Value>,
}

impl TaskArgs {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            values: BTreeMap::new(),
        }
    }

    /// Name of the task being invoked
    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Input that the function cannot do without
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("task '{}' requires input '{}'", self.task, name))
    }

    /// String input, typically a path or URL
    pub fn str(&self, name: &str) -> Result<&str> {
        self.require(name)?.as_str().ok_or_else(|| {
            anyhow!("input '{}' of task '{}' is not a string", name, self.task)
        })
    }

    /// Deserialize an input into a concrete type
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.require(name)?.clone();
        serde_json::from_value(value)
            .with_context(|| format!("input '{}' of task '{}' has the wrong shape", name, self.task))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All inputs as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}
