//! Error taxonomy for wiring, reference resolution and execution

use crate::storage::StorageError;
use thiserror::Error;

/// Boxed cause of a task function failure
pub type TaskFailure = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    // Wiring errors, raised while pipelines are declared
    #[error("task '{task}' is already declared in pipeline '{pipeline}'")]
    DuplicateTaskName { pipeline: String, task: String },

    #[error("output path '{path}' of task '{task}' is already used by task '{existing}' in pipeline '{pipeline}'")]
    DuplicateOutputPath {
        pipeline: String,
        task: String,
        path: String,
        existing: String,
    },

    #[error("pipeline '{pipeline}' has no task named '{task}'")]
    UnknownTask { pipeline: String, task: String },

    #[error("pipeline '{pipeline}' has no output named '{output}'")]
    UnknownOutput { pipeline: String, output: String },

    #[error("pipeline '{pipeline}' cannot use task '{task}' of pipeline '{owner}' directly; consume one of its outputs instead")]
    ForeignTaskReference {
        pipeline: String,
        owner: String,
        task: String,
    },

    #[error("pipeline '{0}' is already registered")]
    DuplicatePipeline(String),

    #[error("no pipeline named '{0}'")]
    UnknownPipeline(String),

    #[error("dependency cycle in '{pipeline}' involving: {}", .members.join(", "))]
    CyclicDependency { pipeline: String, members: Vec<String> },

    // Reference errors, raised when ordering assumptions are violated
    #[error("reference to '{pipeline}.{task}' was consulted before it had a result")]
    UnresolvedReference { pipeline: String, task: String },

    #[error("task '{task}' depends on '{pipeline}.{dependency}', which has not completed")]
    DependencyNotReady {
        task: String,
        pipeline: String,
        dependency: String,
    },

    #[error("task '{task}' failed: {source}")]
    Execution {
        task: String,
        #[source]
        source: TaskFailure,
    },

    #[error("cached artifact for task '{task}' at {locator} could not be read: {source}")]
    CacheInconsistency {
        task: String,
        locator: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Wrap a task function failure
    pub fn execution(task: impl Into<String>, error: anyhow::Error) -> Self {
        PipelineError::Execution {
            task: task.into(),
            source: error.into(),
        }
    }

    /// Name of the task this error is attributed to, if any
    pub fn task(&self) -> Option<&str> {
        match self {
            PipelineError::DuplicateTaskName { task, .. }
            | PipelineError::DuplicateOutputPath { task, .. }
            | PipelineError::UnknownTask { task, .. }
            | PipelineError::ForeignTaskReference { task, .. }
            | PipelineError::DependencyNotReady { task, .. }
            | PipelineError::Execution { task, .. }
            | PipelineError::CacheInconsistency { task, .. } => Some(task),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
