//! Task executor - applies the cache policy and runs one task function

use crate::{
    core::{PipelineError, PipelineResult, TaskArgs, TaskFunction},
    storage::{ArtifactStore, Locator},
};
use anyhow::anyhow;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an existing artifact is judged to still be valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// An artifact at the output location is always reused
    #[default]
    Location,

    /// Reuse only if no input artifact was modified after it
    InputsNewer,
}

/// Everything needed to run one task, detached from its pipeline
#[derive(Clone)]
pub struct TaskJob {
    pub task: String,
    pub function: Arc<dyn TaskFunction>,
    pub locator: Locator,
    pub args: TaskArgs,
    /// Locators of path and reference inputs, for freshness checks
    pub input_locators: Vec<Locator>,
    /// Recompute even if an artifact exists
    pub force: bool,
}

/// Result of executing a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Existing artifact was loaded; function not invoked
    Cached(Value),
    /// Function ran and its value was persisted
    Computed(Value),
}

impl TaskOutcome {
    pub fn into_value(self) -> Value {
        match self {
            TaskOutcome::Cached(value) | TaskOutcome::Computed(value) => value,
        }
    }
}

/// Executes a single task
pub struct TaskExecutor {
    store: Arc<dyn ArtifactStore>,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    /// Execute a task and return the result
    pub async fn execute(&self, job: TaskJob, freshness: Freshness) -> PipelineResult<TaskOutcome> {
        if !job.force {
            if let Some(value) = self.load_cached(&job, freshness).await? {
                info!("Task {} satisfied from {}", job.task, job.locator);
                return Ok(TaskOutcome::Cached(value));
            }
        } else {
            debug!("Task {} forced; ignoring any artifact at {}", job.task, job.locator);
        }

        info!("Executing task: {}", job.task);
        let value = self.compute(&job).await?;
        self.store.write(&job.locator, &value).await?;
        info!("Task {} wrote {}", job.task, job.locator);

        Ok(TaskOutcome::Computed(value))
    }

    async fn load_cached(&self, job: &TaskJob, freshness: Freshness) -> PipelineResult<Option<Value>> {
        if !self.store.exists(&job.locator).await? {
            return Ok(None);
        }

        if freshness == Freshness::InputsNewer {
            if let Some(input) = self.newer_input(job).await? {
                info!(
                    "Input {} changed since {} was written; recomputing {}",
                    input, job.locator, job.task
                );
                return Ok(None);
            }
        }

        self.store
            .read(&job.locator)
            .await
            .map(Some)
            .map_err(|source| PipelineError::CacheInconsistency {
                task: job.task.clone(),
                locator: job.locator.to_string(),
                source,
            })
    }

    async fn newer_input(&self, job: &TaskJob) -> PipelineResult<Option<Locator>> {
        let Some(written_at) = self.store.modified(&job.locator).await? else {
            return Ok(None);
        };

        for input in &job.input_locators {
            match self.store.modified(input).await {
                Ok(Some(modified)) if modified > written_at => return Ok(Some(input.clone())),
                Ok(_) => {}
                Err(e) => warn!("Cannot check freshness of {} for {}: {}", input, job.task, e),
            }
        }

        Ok(None)
    }

    async fn compute(&self, job: &TaskJob) -> PipelineResult<Value> {
        let function = Arc::clone(&job.function);
        let args = job.args.clone();

        match tokio::task::spawn_blocking(move || function.invoke(&args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PipelineError::execution(&job.task, e)),
            Err(e) => Err(PipelineError::execution(
                &job.task,
                anyhow!("task function did not return: {}", e),
            )),
        }
    }
}
