//! Scenario-based tests for data-pipeline

mod caching;
mod cross_pipeline;
mod failure_handling;
mod task_selection;
mod yaml_pipelines;
