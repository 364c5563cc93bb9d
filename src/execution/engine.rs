//! Main execution engine - orchestrates a pipeline run

use crate::{
    core::{
        ExecutionStatus, Pipeline, PipelineError, PipelineResult, Reference, TaskArgs, TaskInput,
        TaskStatus,
    },
    execution::{ExecutionScheduler, Freshness, SchedulingStrategy, TaskExecutor, TaskJob, TaskOutcome},
    storage::{ArtifactStore, Locator},
};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-run switches
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Recompute every selected task regardless of existing artifacts
    pub overwrite: bool,

    /// Recompute only these tasks regardless of existing artifacts
    pub force: BTreeSet<String>,

    /// Restrict the run to these tasks; `None` runs everything
    pub only: Option<BTreeSet<String>>,

    pub freshness: Freshness,
}

impl RunOptions {
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub fn force<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force.extend(tasks.into_iter().map(Into::into));
        self
    }

    pub fn only<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(tasks.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn is_selected(&self, task: &str) -> bool {
        self.only.as_ref().map_or(true, |only| only.contains(task))
    }

    pub fn is_forced(&self, task: &str) -> bool {
        self.overwrite || self.force.contains(task)
    }
}

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_tasks: usize,
    },
    TaskStarted {
        task: String,
    },
    TaskCached {
        task: String,
        locator: Locator,
    },
    TaskSucceeded {
        task: String,
        locator: Locator,
    },
    TaskFailed {
        task: String,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        pipeline_name: String,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

type BatchResult = (String, DateTime<Utc>, PipelineResult<TaskOutcome>);

/// Main pipeline execution engine
pub struct ExecutionEngine {
    scheduler: ExecutionScheduler,
    executor: Arc<TaskExecutor>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn ArtifactStore>, strategy: SchedulingStrategy) -> Self {
        Self {
            scheduler: ExecutionScheduler::new(strategy),
            executor: Arc::new(TaskExecutor::new(store)),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Artifact store every task reads and writes through
    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        self.executor.store()
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.scheduler.strategy()
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the pipeline, stopping at the first failed task
    ///
    /// Every selected task ends up cached, succeeded or failed; on success
    /// the pipeline's results become resolvable through its references.
    pub async fn execute(&self, pipeline: &mut Pipeline, options: &RunOptions) -> PipelineResult<()> {
        Self::validate_options(pipeline, options)?;
        let order = pipeline.execution_order()?;
        let total = order.iter().filter(|name| options.is_selected(name)).count();

        pipeline.reset_for_run();
        pipeline.state.start(total);
        let execution_id = pipeline.state.execution_id;

        info!(
            "Starting pipeline execution: {} ({}, {} tasks)",
            pipeline.name, execution_id, total
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_tasks: total,
        })
        .await;

        loop {
            let batch = self.scheduler.next_tasks(pipeline, &order, options);
            if batch.is_empty() {
                break;
            }

            let mut jobs = Vec::with_capacity(batch.len());
            for name in &batch {
                match self.prepare(pipeline, name, options).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        self.mark_failed(pipeline, name, &e).await;
                        return self.abort(pipeline, e).await;
                    }
                }
            }

            for job in &jobs {
                self.emit_event(ExecutionEvent::TaskStarted {
                    task: job.task.clone(),
                })
                .await;
            }

            let mut failure = None;
            for (name, started_at, outcome) in self.run_batch(jobs, options.freshness).await {
                match outcome {
                    Ok(outcome) => self.record_outcome(pipeline, &name, started_at, outcome).await,
                    Err(e) => {
                        self.mark_failed(pipeline, &name, &e).await;
                        match failure {
                            None => failure = Some(e),
                            Some(_) => warn!("Additional failure in the same batch: {}", e),
                        }
                    }
                }
            }

            if let Some(e) = failure {
                return self.abort(pipeline, e).await;
            }
        }

        pipeline.results().mark_completed();
        pipeline.state.complete();
        info!(
            "Pipeline {} completed: {} executed, {} cached",
            pipeline.name, pipeline.state.executed_tasks, pipeline.state.cached_tasks
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            status: pipeline.state.status,
        })
        .await;

        Ok(())
    }

    fn validate_options(pipeline: &Pipeline, options: &RunOptions) -> PipelineResult<()> {
        let named = options.force.iter().chain(options.only.iter().flatten());
        for name in named {
            if pipeline.task(name).is_none() {
                return Err(PipelineError::UnknownTask {
                    pipeline: pipeline.name.clone(),
                    task: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolve a task's inputs into a self-contained job
    async fn prepare(&self, pipeline: &Pipeline, name: &str, options: &RunOptions) -> PipelineResult<TaskJob> {
        let task = pipeline.task(name).ok_or_else(|| PipelineError::UnknownTask {
            pipeline: pipeline.name.clone(),
            task: name.to_string(),
        })?;

        let mut args = TaskArgs::new(name);
        let mut input_locators = Vec::new();

        for (param, input) in task.inputs() {
            let value = match input {
                TaskInput::Literal(value) => value.clone(),
                TaskInput::Path(path) => {
                    let locator = pipeline.input_locator(path);
                    let value = Value::String(locator.to_string());
                    input_locators.push(locator);
                    value
                }
                TaskInput::Reference(reference) => {
                    input_locators.push(reference.locator().clone());
                    self.resolve_reference(pipeline, name, reference).await?
                }
            };
            args.insert(param.clone(), value);
        }

        Ok(TaskJob {
            task: name.to_string(),
            function: task.function(),
            locator: pipeline.output_locator(task),
            args,
            input_locators,
            force: options.is_forced(name),
        })
    }

    async fn resolve_reference(
        &self,
        pipeline: &Pipeline,
        consumer: &str,
        reference: &Reference,
    ) -> PipelineResult<Value> {
        let local = reference.pipeline_id() == pipeline.id();
        let not_ready = || PipelineError::DependencyNotReady {
            task: consumer.to_string(),
            pipeline: reference.pipeline_name().to_string(),
            dependency: reference.task_name().to_string(),
        };

        if !local && !reference.owner_completed() {
            return Err(not_ready());
        }

        if let Some(value) = reference.recorded() {
            return Ok(value);
        }

        // Producer was left out of its run; fall back to the persisted artifact.
        let store = self.executor.store();
        if !store.exists(reference.locator()).await? {
            return Err(not_ready());
        }

        debug!(
            "Loading {} for {} from {}",
            reference,
            consumer,
            reference.locator()
        );
        store
            .read(reference.locator())
            .await
            .map_err(|source| PipelineError::CacheInconsistency {
                task: reference.task_name().to_string(),
                locator: reference.locator().to_string(),
                source,
            })
    }

    async fn run_batch(&self, jobs: Vec<TaskJob>, freshness: Freshness) -> Vec<BatchResult> {
        if jobs.len() == 1 {
            let mut results = Vec::with_capacity(1);
            for job in jobs {
                let name = job.task.clone();
                let started_at = Utc::now();
                let outcome = self.executor.execute(job, freshness).await;
                results.push((name, started_at, outcome));
            }
            return results;
        }

        let names: Vec<String> = jobs.iter().map(|job| job.task.clone()).collect();
        let mut set = JoinSet::new();
        for job in jobs {
            let executor = Arc::clone(&self.executor);
            set.spawn(async move {
                let name = job.task.clone();
                let started_at = Utc::now();
                let outcome = executor.execute(job, freshness).await;
                (name, started_at, outcome)
            });
        }

        let mut finished = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, started_at, outcome)) => {
                    finished.insert(name, (started_at, outcome));
                }
                Err(e) => error!("Task join failed: {}", e),
            }
        }

        // Report in scheduling order so the first failure is deterministic.
        names
            .into_iter()
            .map(|name| {
                let (started_at, outcome) = finished.remove(&name).unwrap_or_else(|| {
                    (
                        Utc::now(),
                        Err(PipelineError::execution(&name, anyhow!("task was cancelled"))),
                    )
                });
                (name, started_at, outcome)
            })
            .collect()
    }

    async fn record_outcome(
        &self,
        pipeline: &mut Pipeline,
        name: &str,
        started_at: DateTime<Utc>,
        outcome: TaskOutcome,
    ) {
        let locator = match pipeline.task(name) {
            Some(task) => pipeline.output_locator(task),
            None => return,
        };

        let (status, event) = match outcome {
            TaskOutcome::Cached(value) => {
                pipeline.results().record(name, value);
                (
                    TaskStatus::SkippedCached { loaded_at: Utc::now() },
                    ExecutionEvent::TaskCached {
                        task: name.to_string(),
                        locator,
                    },
                )
            }
            TaskOutcome::Computed(value) => {
                pipeline.results().record(name, value);
                (
                    TaskStatus::Succeeded {
                        started_at,
                        completed_at: Utc::now(),
                    },
                    ExecutionEvent::TaskSucceeded {
                        task: name.to_string(),
                        locator,
                    },
                )
            }
        };

        pipeline.state.record(&status);
        if let Some(task) = pipeline.task_mut(name) {
            task.status = status;
        }
        self.emit_event(event).await;
    }

    async fn mark_failed(&self, pipeline: &mut Pipeline, name: &str, error: &PipelineError) {
        error!("Task {} failed: {}", name, error);
        let status = TaskStatus::Failed {
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        pipeline.state.record(&status);
        if let Some(task) = pipeline.task_mut(name) {
            task.status = status;
        }
        self.emit_event(ExecutionEvent::TaskFailed {
            task: name.to_string(),
            error: error.to_string(),
        })
        .await;
    }

    async fn abort(&self, pipeline: &mut Pipeline, error: PipelineError) -> PipelineResult<()> {
        pipeline.state.fail();
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: pipeline.state.execution_id,
            pipeline_name: pipeline.name.clone(),
            status: pipeline.state.status,
        })
        .await;
        Err(error)
    }
}
