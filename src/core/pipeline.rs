//! Pipeline domain model

use crate::core::{
    error::{PipelineError, PipelineResult},
    reference::{Reference, Results},
    state::{PipelineState, TaskStatus},
    task::{Task, TaskFunction, TaskInput},
};
use crate::storage::Locator;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// An ordered registry of tasks plus the names it exposes to other pipelines
#[derive(Debug)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    id: Uuid,

    input_root: String,

    output_root: String,

    /// Tasks in declaration order
    tasks: Vec<Task>,

    index: HashMap<String, usize>,

    /// Public output name -> task name
    outputs: BTreeMap<String, String>,

    results: Results,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline whose paths are used as-is
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_roots(name, "", "")
    }

    /// Create a pipeline reading relative inputs under `input_root` and
    /// writing artifacts under `output_root`
    pub fn with_roots(
        name: impl Into<String>,
        input_root: impl Into<String>,
        output_root: impl Into<String>,
    ) -> Self {
        Pipeline {
            name: name.into(),
            id: Uuid::new_v4(),
            input_root: input_root.into(),
            output_root: output_root.into(),
            tasks: Vec::new(),
            index: HashMap::new(),
            outputs: BTreeMap::new(),
            results: Results::new(),
            state: PipelineState::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input_root(&self) -> &str {
        &self.input_root
    }

    pub fn output_root(&self) -> &str {
        &self.output_root
    }

    /// Declare a task
    pub fn add_task<F, I, K>(
        &mut self,
        name: &str,
        function: F,
        output_path: &str,
        inputs: I,
    ) -> PipelineResult<&Task>
    where
        F: TaskFunction + 'static,
        I: IntoIterator<Item = (K, TaskInput)>,
        K: Into<String>,
    {
        self.add_shared_task(name, Arc::new(function), output_path, inputs)
    }

    /// Declare a task whose function is already shared, e.g. from a registry
    pub fn add_shared_task<I, K>(
        &mut self,
        name: &str,
        function: Arc<dyn TaskFunction>,
        output_path: &str,
        inputs: I,
    ) -> PipelineResult<&Task>
    where
        I: IntoIterator<Item = (K, TaskInput)>,
        K: Into<String>,
    {
        if self.index.contains_key(name) {
            return Err(PipelineError::DuplicateTaskName {
                pipeline: self.name.clone(),
                task: name.to_string(),
            });
        }

        let locator = Locator::join(&self.output_root, output_path);
        if let Some(existing) = self.tasks.iter().find(|t| self.output_locator(t) == locator) {
            return Err(PipelineError::DuplicateOutputPath {
                pipeline: self.name.clone(),
                task: name.to_string(),
                path: output_path.to_string(),
                existing: existing.name.clone(),
            });
        }

        let inputs: BTreeMap<String, TaskInput> =
            inputs.into_iter().map(|(k, v)| (k.into(), v)).collect();

        for reference in inputs.values().filter_map(TaskInput::as_reference) {
            if reference.pipeline_id() != self.id && !reference.is_public() {
                return Err(PipelineError::ForeignTaskReference {
                    pipeline: self.name.clone(),
                    owner: reference.pipeline_name().to_string(),
                    task: reference.task_name().to_string(),
                });
            }
        }

        let task = Task::new(
            name.to_string(),
            function,
            output_path.to_string(),
            inputs,
        );
        self.index.insert(name.to_string(), self.tasks.len());
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Deferred handle to a declared task's result
    pub fn get_task(&self, name: &str) -> PipelineResult<Reference> {
        let task = self.task(name).ok_or_else(|| self.unknown_task(name))?;
        Ok(self.reference_to(task, None))
    }

    /// Publish tasks under stable output names, replacing earlier mappings
    pub fn set_outputs<I, K, V>(&mut self, mapping: I) -> PipelineResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut outputs = BTreeMap::new();
        for (output, task) in mapping {
            let task = task.into();
            if !self.index.contains_key(&task) {
                return Err(self.unknown_task(&task));
            }
            outputs.insert(output.into(), task);
        }
        self.outputs = outputs;
        Ok(())
    }

    /// Deferred handle to a public output, usable from other pipelines
    pub fn get_output(&self, name: &str) -> PipelineResult<Reference> {
        let task_name = self
            .outputs
            .get(name)
            .ok_or_else(|| PipelineError::UnknownOutput {
                pipeline: self.name.clone(),
                output: name.to_string(),
            })?;
        let task = self
            .task(task_name)
            .ok_or_else(|| self.unknown_task(task_name))?;
        Ok(self.reference_to(task, Some(name)))
    }

    /// Get a task by name
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub(crate) fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.tasks[i]),
            None => None,
        }
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// Fully qualified artifact location of a task
    pub fn output_locator(&self, task: &Task) -> Locator {
        Locator::join(&self.output_root, &task.output_path)
    }

    /// Absolute locator for a path input
    pub fn input_locator(&self, path: &str) -> Locator {
        Locator::join(&self.input_root, path)
    }

    /// Result of a task recorded in the current or last run
    pub fn result(&self, task: &str) -> Option<Value> {
        self.results.get(task)
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    /// Whether the latest run finished
    pub fn is_complete(&self) -> bool {
        self.results.is_completed()
    }

    /// Check whether any task failed in the latest run
    pub fn has_failed(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Failed { .. }))
    }

    /// Distinct pipelines this one consumes outputs from, as (id, name)
    pub fn upstream_pipelines(&self) -> Vec<(Uuid, String)> {
        let mut upstream: Vec<(Uuid, String)> = Vec::new();
        for task in &self.tasks {
            for reference in task.external_references(self.id) {
                if !upstream.iter().any(|(id, _)| *id == reference.pipeline_id()) {
                    upstream.push((reference.pipeline_id(), reference.pipeline_name().to_string()));
                }
            }
        }
        upstream
    }

    /// Stable topological order over same-pipeline references
    ///
    /// Ties are broken by declaration index, so a well-formed pipeline runs
    /// in exactly the order its tasks were declared.
    pub fn execution_order(&self) -> PipelineResult<Vec<String>> {
        let count = self.tasks.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (i, task) in self.tasks.iter().enumerate() {
            for dep in task.local_dependencies(self.id) {
                let Some(&d) = self.index.get(dep) else {
                    return Err(self.unknown_task(dep));
                };
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(self.tasks[i].name.clone());
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < count {
            // Tasks left over are on a cycle or downstream of one
            let blocked: Vec<bool> = in_degree.iter().map(|&degree| degree > 0).collect();
            let members = (0..count)
                .filter(|&i| blocked[i] && Self::reaches(i, i, &dependents, &blocked))
                .map(|i| self.tasks[i].name.clone())
                .collect();
            return Err(PipelineError::CyclicDependency {
                pipeline: self.name.clone(),
                members,
            });
        }

        Ok(order)
    }

    /// Whether `target` is reachable from `start` along dependent edges
    /// between blocked tasks
    fn reaches(start: usize, target: usize, dependents: &[Vec<usize>], blocked: &[bool]) -> bool {
        let mut seen = vec![false; dependents.len()];
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &next in &dependents[i] {
                if next == target {
                    return true;
                }
                if blocked[next] && !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Clear statuses and results before a new run
    pub(crate) fn reset_for_run(&mut self) {
        for task in &mut self.tasks {
            task.status = TaskStatus::Pending;
        }
        self.results.reset();
    }

    fn reference_to(&self, task: &Task, output: Option<&str>) -> Reference {
        Reference::new(
            self.id,
            &self.name,
            &task.name,
            output,
            self.output_locator(task),
            self.results.clone(),
        )
    }

    fn unknown_task(&self, name: &str) -> PipelineError {
        PipelineError::UnknownTask {
            pipeline: self.name.clone(),
            task: name.to_string(),
        }
    }
}
