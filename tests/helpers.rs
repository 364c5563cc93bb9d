//! Test utility functions for data-pipeline
#![allow(dead_code)]

use data_pipeline::core::{Pipeline, PipelineResult, TaskArgs, TaskInput, TaskStatus};
use data_pipeline::execution::{ExecutionEngine, ExecutionEvent, RunOptions, SchedulingStrategy};
use data_pipeline::storage::{InMemoryArtifactStore, Locator};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Records which task functions ran, in invocation order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task: &str) {
        self.calls.lock().unwrap().push(task.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, task: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == task).count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Function producing a constant value
    pub fn emit(&self, value: Value) -> impl Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static {
        let log = self.clone();
        move |args: &TaskArgs| {
            log.record(args.task_name());
            Ok(value.clone())
        }
    }

    /// Function appending `suffix` to its string `input`
    pub fn append(&self, suffix: &str) -> impl Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static {
        let log = self.clone();
        let suffix = suffix.to_string();
        move |args: &TaskArgs| {
            log.record(args.task_name());
            Ok(Value::String(format!("{}{}", args.str("input")?, suffix)))
        }
    }

    /// Function that always fails with `message`
    pub fn failing(&self, message: &str) -> impl Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static {
        let log = self.clone();
        let message = message.to_string();
        move |args: &TaskArgs| {
            log.record(args.task_name());
            Err(anyhow::anyhow!("{}", message))
        }
    }

    /// Function returning all of its inputs as one object
    pub fn echo(&self) -> impl Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static {
        let log = self.clone();
        move |args: &TaskArgs| {
            log.record(args.task_name());
            Ok(args.to_value())
        }
    }
}

/// Engine over an in-memory store that keeps every emitted event
pub struct Harness {
    pub store: Arc<InMemoryArtifactStore>,
    pub engine: ExecutionEngine,
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryArtifactStore::new()), SchedulingStrategy::Sequential).await
    }

    pub async fn with_strategy(strategy: SchedulingStrategy) -> Self {
        Self::with_store(Arc::new(InMemoryArtifactStore::new()), strategy).await
    }

    /// Engine over an existing store, e.g. to simulate a later process
    pub async fn with_store(store: Arc<InMemoryArtifactStore>, strategy: SchedulingStrategy) -> Self {
        let engine = ExecutionEngine::new(store.clone(), strategy);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine
            .add_event_handler(move |event| sink.lock().unwrap().push(event))
            .await;

        Self { store, engine, events }
    }

    pub async fn run(&self, pipeline: &mut Pipeline) -> PipelineResult<()> {
        self.engine.execute(pipeline, &RunOptions::default()).await
    }

    pub async fn run_with(&self, pipeline: &mut Pipeline, options: &RunOptions) -> PipelineResult<()> {
        self.engine.execute(pipeline, options).await
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of tasks that emitted `TaskSucceeded`
    pub fn succeeded(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecutionEvent::TaskSucceeded { task, .. } => Some(task),
                _ => None,
            })
            .collect()
    }

    /// Names of tasks that emitted `TaskCached`
    pub fn cached(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecutionEvent::TaskCached { task, .. } => Some(task),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub async fn artifact(&self, locator: &str) -> Option<Value> {
        self.store.get(&Locator::new(locator)).await
    }
}

pub fn no_inputs() -> Vec<(String, TaskInput)> {
    Vec::new()
}

/// Assert a task's status label (`pending`, `cached`, `succeeded`, `failed`)
pub fn assert_task_status(pipeline: &Pipeline, task: &str, expected: &str) {
    let status = pipeline
        .task(task)
        .map(|t| t.status.label())
        .unwrap_or_else(|| panic!("pipeline '{}' has no task '{}'", pipeline.name, task));
    assert_eq!(status, expected, "unexpected status for task '{}'", task);
}

pub fn assert_task_failed_with(pipeline: &Pipeline, task: &str, message: &str) {
    match pipeline.task(task).map(|t| &t.status) {
        Some(TaskStatus::Failed { error, .. }) => assert!(
            error.contains(message),
            "task '{}' failed with '{}', expected it to mention '{}'",
            task,
            error,
            message
        ),
        other => panic!("expected task '{}' to have failed, got {:?}", task, other),
    }
}

/// P(A -> B): A emits "a", B appends "b" to it
pub fn two_step_pipeline(log: &CallLog) -> Pipeline {
    let mut pipeline = Pipeline::new("p");
    pipeline
        .add_task("a", log.emit(Value::String("a".to_string())), "/a.ht", no_inputs())
        .unwrap();
    let a = pipeline.get_task("a").unwrap();
    pipeline
        .add_task("b", log.append("b"), "/b.ht", [("input", TaskInput::from(a))])
        .unwrap();
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_harness_runs_two_step_pipeline() {
        let log = CallLog::new();
        let harness = Harness::new().await;
        let mut pipeline = two_step_pipeline(&log);

        harness.run(&mut pipeline).await.unwrap();

        assert_eq!(log.calls(), vec!["a", "b"]);
        assert_eq!(harness.succeeded(), vec!["a", "b"]);
        assert_eq!(harness.artifact("/b.ht").await, Some(json!("ab")));
        assert_task_status(&pipeline, "b", "succeeded");
    }
}
