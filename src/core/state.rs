//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every selected task finished
    Completed,
    /// A task failed and the run was aborted
    Failed,
}

/// State of a single task within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task has not been processed in this run
    Pending,
    /// An artifact already existed; it was loaded instead of recomputed
    SkippedCached {
        loaded_at: DateTime<Utc>,
    },
    /// Task function ran and its result was persisted
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Task function (or input resolution) failed
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl TaskStatus {
    /// Check if task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// Terminal and produced a usable result
    pub fn has_result(&self) -> bool {
        matches!(self, TaskStatus::SkippedCached { .. } | TaskStatus::Succeeded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::SkippedCached { .. } => "cached",
            TaskStatus::Succeeded { .. } => "succeeded",
            TaskStatus::Failed { .. } => "failed",
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID, regenerated for every run
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of tasks selected for this run
    pub total_tasks: usize,

    /// Tasks whose function was invoked successfully
    pub executed_tasks: usize,

    /// Tasks satisfied from an existing artifact
    pub cached_tasks: usize,

    /// Tasks that failed
    pub failed_tasks: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_tasks: 0,
            executed_tasks: 0,
            cached_tasks: 0,
            failed_tasks: 0,
        }
    }

    /// Reset counters and mark a new run as started
    pub fn start(&mut self, total_tasks: usize) {
        *self = Self::new();
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_tasks = total_tasks;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Count a task that reached a terminal status
    pub fn record(&mut self, status: &TaskStatus) {
        match status {
            TaskStatus::SkippedCached { .. } => self.cached_tasks += 1,
            TaskStatus::Succeeded { .. } => self.executed_tasks += 1,
            TaskStatus::Failed { .. } => self.failed_tasks += 1,
            TaskStatus::Pending => {}
        }
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.executed_tasks + self.cached_tasks + self.failed_tasks) as f64
            / self.total_tasks as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
