//! Task domain model

use crate::core::{args::TaskArgs, reference::Reference, state::TaskStatus};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A transformation: keyword inputs in, exactly one dataset value out.
///
/// Implementations may block for as long as the underlying job takes; the
/// engine runs them off the async runtime.
pub trait TaskFunction: Send + Sync {
    fn invoke(&self, args: &TaskArgs) -> anyhow::Result<Value>;
}

impl<F> TaskFunction for F
where
    F: Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, args: &TaskArgs) -> anyhow::Result<Value> {
        self(args)
    }
}

/// One declared input of a task
#[derive(Debug, Clone)]
pub enum TaskInput {
    /// Passed through unchanged
    Literal(Value),
    /// Storage path, joined with the pipeline's input root at run time
    Path(String),
    /// Result of another task, possibly in another pipeline
    Reference(Reference),
}

impl TaskInput {
    pub fn literal(value: impl Into<Value>) -> Self {
        TaskInput::Literal(value.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        TaskInput::Path(path.into())
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            TaskInput::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

impl From<Reference> for TaskInput {
    fn from(reference: Reference) -> Self {
        TaskInput::Reference(reference)
    }
}

impl From<Value> for TaskInput {
    fn from(value: Value) -> Self {
        TaskInput::Literal(value)
    }
}

/// A single named unit of work in a pipeline
#[derive(Clone)]
pub struct Task {
    /// Unique task name within its pipeline
    pub name: String,

    /// Path relative to the pipeline's output root; also the cache key
    pub output_path: String,

    inputs: BTreeMap<String, TaskInput>,

    function: Arc<dyn TaskFunction>,

    /// Runtime state
    pub status: TaskStatus,
}

impl Task {
    pub(crate) fn new(
        name: String,
        function: Arc<dyn TaskFunction>,
        output_path: String,
        inputs: BTreeMap<String, TaskInput>,
    ) -> Self {
        Self {
            name,
            output_path,
            inputs,
            function,
            status: TaskStatus::Pending,
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, TaskInput> {
        &self.inputs
    }

    pub fn function(&self) -> Arc<dyn TaskFunction> {
        Arc::clone(&self.function)
    }

    /// All reference inputs, in parameter order
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.inputs.values().filter_map(TaskInput::as_reference)
    }

    /// Names of tasks in the same pipeline this task consumes
    pub fn local_dependencies(&self, pipeline_id: Uuid) -> Vec<&str> {
        self.references()
            .filter(|r| r.pipeline_id() == pipeline_id)
            .map(Reference::task_name)
            .collect()
    }

    /// References into other pipelines
    pub fn external_references(&self, pipeline_id: Uuid) -> impl Iterator<Item = &Reference> {
        self.references()
            .filter(move |r| r.pipeline_id() != pipeline_id)
    }

    #[cfg(test)]
    pub(crate) fn inputs_mut(&mut self) -> &mut BTreeMap<String, TaskInput> {
        &mut self.inputs
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("output_path", &self.output_path)
            .field("inputs", &self.inputs)
            .field("status", &self.status)
            .finish()
    }
}
