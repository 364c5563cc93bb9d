//! Execution scheduler - determines which tasks to run next

use crate::core::Pipeline;
use crate::execution::RunOptions;

/// Strategy for scheduling task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute tasks in dependency order, one at a time
    #[default]
    Sequential,

    /// Execute every ready task at once
    Parallel,

    /// Limited parallelism (max N concurrent tasks)
    LimitedParallel(usize),
}

/// Scheduler for determining which tasks to run
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Get the next batch of tasks to execute
    ///
    /// `order` must be a topological order of the pipeline. Only selected,
    /// still pending tasks are returned.
    pub fn next_tasks(&self, pipeline: &Pipeline, order: &[String], options: &RunOptions) -> Vec<String> {
        match self.strategy {
            SchedulingStrategy::Sequential => self.next_sequential(pipeline, order, options),
            SchedulingStrategy::Parallel => self.next_ready(pipeline, order, options, usize::MAX),
            SchedulingStrategy::LimitedParallel(max) => {
                self.next_ready(pipeline, order, options, max.max(1))
            }
        }
    }

    fn next_sequential(&self, pipeline: &Pipeline, order: &[String], options: &RunOptions) -> Vec<String> {
        order
            .iter()
            .find(|name| Self::is_pending(pipeline, name, options))
            .map(|name| vec![name.clone()])
            .unwrap_or_default()
    }

    fn next_ready(
        &self,
        pipeline: &Pipeline,
        order: &[String],
        options: &RunOptions,
        max: usize,
    ) -> Vec<String> {
        order
            .iter()
            .filter(|name| Self::is_pending(pipeline, name, options))
            .filter(|name| Self::dependencies_settled(pipeline, name, options))
            .take(max)
            .cloned()
            .collect()
    }

    fn is_pending(pipeline: &Pipeline, name: &str, options: &RunOptions) -> bool {
        options.is_selected(name)
            && pipeline
                .task(name)
                .is_some_and(|task| !task.status.is_terminal())
    }

    /// Every local dependency either produced a result this run or is not
    /// part of the run at all (its artifact is loaded on demand).
    fn dependencies_settled(pipeline: &Pipeline, name: &str, options: &RunOptions) -> bool {
        let Some(task) = pipeline.task(name) else {
            return false;
        };

        task.local_dependencies(pipeline.id()).iter().all(|dep| {
            !options.is_selected(dep)
                || pipeline
                    .task(dep)
                    .is_some_and(|d| d.status.has_result())
        })
    }

    /// Check if there are more tasks to run
    pub fn has_more(&self, pipeline: &Pipeline, order: &[String], options: &RunOptions) -> bool {
        !self.next_tasks(pipeline, order, options).is_empty()
    }
}
