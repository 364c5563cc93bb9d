//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, RunOptions};
pub use executor::{Freshness, TaskExecutor, TaskJob, TaskOutcome};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
