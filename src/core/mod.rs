//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! pipelines, tasks, the deferred references wiring them together, and
//! their YAML configuration.

pub mod args;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reference;
pub mod state;
pub mod task;

pub use args::TaskArgs;
pub use config::{InputConfig, PipelineConfig, TaskConfig};
pub use error::{PipelineError, PipelineResult, TaskFailure};
pub use pipeline::Pipeline;
pub use reference::{Reference, Results};
pub use state::*;
pub use task::{Task, TaskFunction, TaskInput};
