//! data-pipeline - task-graph orchestration with resumable artifact caching
//!
//! Pipelines are registries of named tasks. Each task writes one artifact to
//! a stable location; a task whose artifact already exists is loaded instead
//! of recomputed, so an interrupted run resumes where it stopped. Pipelines
//! publish named outputs that other pipelines consume through deferred
//! [`Reference`]s.

pub mod catalog;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod storage;

// Re-export commonly used types
pub use catalog::{Catalog, FunctionRegistry};
pub use core::{
    ExecutionStatus, Pipeline, PipelineConfig, PipelineError, PipelineResult, Reference, TaskArgs,
    TaskFunction, TaskInput, TaskStatus,
};
pub use execution::{ExecutionEngine, ExecutionEvent, Freshness, RunOptions, SchedulingStrategy};
pub use storage::{ArtifactStore, InMemoryArtifactStore, LocalArtifactStore, Locator, StorageError};
