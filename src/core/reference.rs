//! Deferred references to task results
//!
//! A reference is handed out while pipelines are being wired and only
//! becomes meaningful once the owning pipeline has run. It carries a shared
//! handle to the owner's result cache rather than the data itself.

use crate::core::error::{PipelineError, PipelineResult};
use crate::storage::Locator;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct ResultCache {
    completed: bool,
    values: HashMap<String, Value>,
}

/// Per-pipeline result cache, shared between a pipeline and every reference
/// pointing into it.
///
/// Lives for the process only; artifacts in storage are the durable state.
#[derive(Debug, Clone, Default)]
pub struct Results {
    inner: Arc<RwLock<ResultCache>>,
}

impl Results {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Result recorded for `task` during the current run
    pub fn get(&self, task: &str) -> Option<Value> {
        let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        cache.values.get(task).cloned()
    }

    pub fn contains(&self, task: &str) -> bool {
        let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        cache.values.contains_key(task)
    }

    /// Whether the owning pipeline finished its latest run
    pub fn is_completed(&self) -> bool {
        let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        cache.completed
    }

    pub fn len(&self) -> usize {
        let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        cache.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a task result. Results are never overwritten within a run.
    pub(crate) fn record(&self, task: &str, value: Value) {
        let mut cache = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        cache.values.entry(task.to_string()).or_insert(value);
    }

    pub(crate) fn mark_completed(&self) {
        let mut cache = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        cache.completed = true;
    }

    /// Forget everything from a previous run
    pub(crate) fn reset(&self) {
        let mut cache = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        cache.completed = false;
        cache.values.clear();
    }
}

/// Pointer to a task's future result
#[derive(Clone)]
pub struct Reference {
    pipeline_id: Uuid,
    pipeline: String,
    task: String,
    output: Option<String>,
    locator: Locator,
    results: Results,
}

impl Reference {
    pub(crate) fn new(
        pipeline_id: Uuid,
        pipeline: &str,
        task: &str,
        output: Option<&str>,
        locator: Locator,
        results: Results,
    ) -> Self {
        Self {
            pipeline_id,
            pipeline: pipeline.to_string(),
            task: task.to_string(),
            output: output.map(str::to_string),
            locator,
            results,
        }
    }

    /// Identity of the owning pipeline instance
    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    /// Name of the owning pipeline
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Task whose result this reference points at
    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// Public output name, if obtained through `get_output`
    pub fn output_name(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Where the referenced task persists its artifact
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Obtained through `get_output`, and therefore usable from any pipeline
    pub fn is_public(&self) -> bool {
        self.output.is_some()
    }

    pub fn owner_completed(&self) -> bool {
        self.results.is_completed()
    }

    /// Concrete value, available once the owning pipeline has executed
    pub fn resolve(&self) -> PipelineResult<Value> {
        if !self.results.is_completed() {
            return Err(self.unresolved());
        }
        self.results.get(&self.task).ok_or_else(|| self.unresolved())
    }

    /// Value recorded so far in the owner's current run, complete or not
    pub(crate) fn recorded(&self) -> Option<Value> {
        self.results.get(&self.task)
    }

    fn unresolved(&self) -> PipelineError {
        PipelineError::UnresolvedReference {
            pipeline: self.pipeline.clone(),
            task: self.task.clone(),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("pipeline", &self.pipeline)
            .field("task", &self.task)
            .field("output", &self.output)
            .field("locator", &self.locator)
            .finish()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}:{}", self.pipeline, output),
            None => write!(f, "{}.{}", self.pipeline, self.task),
        }
    }
}
