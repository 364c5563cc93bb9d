//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::Pipeline;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed or failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Tasks selected for the run
    pub total_tasks: usize,

    /// Tasks whose function ran
    pub executed_tasks: usize,

    /// Tasks loaded from existing artifacts
    pub cached_tasks: usize,

    pub failed_tasks: usize,

    /// Progress (0.0 to 1.0)
    pub progress: f64,
}

/// Trait for run history backends
#[async_trait::async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same execution ID
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs of a pipeline, most recent first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent run of a pipeline
    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(pipeline_name).await?.into_iter().next())
    }

    /// List all pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryHistory {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HistoryBackend for InMemoryHistory {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|run| run.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|run| run.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline's latest run
pub fn create_summary(pipeline: &Pipeline) -> RunSummary {
    let state = &pipeline.state;
    RunSummary {
        execution_id: state.execution_id,
        pipeline_name: pipeline.name.clone(),
        status: state.status,
        started_at: state.started_at.unwrap_or_else(Utc::now),
        completed_at: state.completed_at,
        total_tasks: state.total_tasks,
        executed_tasks: state.executed_tasks,
        cached_tasks: state.cached_tasks,
        failed_tasks: state.failed_tasks,
        progress: state.progress(),
    }
}
