//! Pipeline configuration from YAML

use crate::catalog::{Catalog, FunctionRegistry};
use crate::core::{Pipeline, TaskInput};
use crate::storage::Locator;
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// `{{ name }}` placeholders in string values
static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, unique within a catalog
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Root that relative path inputs are joined with
    #[serde(default)]
    pub input_root: String,

    /// Root that task output paths are joined with
    #[serde(default)]
    pub output_root: String,

    /// Values substituted for `{{ name }}` in roots, paths and string literals
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Tasks in declaration order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    /// Public output name -> task name
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Task configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Name of a function in the registry
    pub function: String,

    pub output_path: String,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputConfig>,

    #[serde(default)]
    pub description: Option<String>,
}

/// One task input as written in YAML
///
/// ```yaml
/// inputs:
///   vcf: { path: /sites/in.vcf.gz }
///   sites: { task: import_sites }
///   genes: { pipeline: genes, output: base_transcripts }
///   fields: { literal: { path: not-a-path } }
///   min_partitions: 32
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputConfig {
    Path(PathInput),
    Task(TaskRef),
    Output(OutputRef),
    Literal(LiteralInput),
    /// Anything else is a literal value
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathInput {
    pub path: String,
}

/// Earlier task in the same pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRef {
    pub task: String,
}

/// Public output of another pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRef {
    pub pipeline: String,
    pub output: String,
}

/// Escape hatch for literals shaped like one of the other forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiteralInput {
    pub literal: Value,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid pipeline file {}", path.display()))
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load every `*.yaml` / `*.yml` file in a directory, sorted by file name
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read pipeline directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if path.is_file() && is_yaml {
                files.push(path);
            }
        }
        files.sort();

        files
            .iter()
            .map(|path| {
                debug!("Loading pipeline definition {}", path.display());
                Self::from_file(path)
            })
            .collect()
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Pipeline name must not be empty");
        }

        self.render(&self.input_root)?;
        let output_root = self.render(&self.output_root)?;

        let mut declared = HashSet::new();
        let mut paths: HashMap<Locator, &str> = HashMap::new();
        for task in &self.tasks {
            if task.function.trim().is_empty() {
                bail!("Task '{}' has no function", task.name);
            }

            let output_path = self.render(&task.output_path)?;
            let locator = Locator::join(&output_root, &output_path);
            if let Some(existing) = paths.insert(locator, &task.name) {
                bail!(
                    "Task '{}' writes to '{}', already used by task '{}'",
                    task.name,
                    output_path,
                    existing
                );
            }

            for (param, input) in &task.inputs {
                match input {
                    InputConfig::Task(TaskRef { task: dep }) if !declared.contains(dep.as_str()) => {
                        bail!(
                            "Task '{}' input '{}' references task '{}', which is not declared before it",
                            task.name,
                            param,
                            dep
                        );
                    }
                    InputConfig::Output(OutputRef { pipeline, .. }) if *pipeline == self.name => {
                        bail!(
                            "Task '{}' input '{}' references an output of its own pipeline; use `task:`",
                            task.name,
                            param
                        );
                    }
                    InputConfig::Path(PathInput { path }) => {
                        self.render(path)?;
                    }
                    InputConfig::Literal(LiteralInput { literal: value }) | InputConfig::Value(value) => {
                        self.render_value(value)?;
                    }
                    _ => {}
                }
            }

            if !declared.insert(task.name.as_str()) {
                bail!("Duplicate task name: {}", task.name);
            }
        }

        for (output, task) in &self.outputs {
            if !declared.contains(task.as_str()) {
                bail!("Output '{}' maps to non-existent task '{}'", output, task);
            }
        }

        Ok(())
    }

    /// Pipelines whose public outputs this one consumes
    pub fn referenced_pipelines(&self) -> BTreeSet<&str> {
        self.tasks
            .iter()
            .flat_map(|task| task.inputs.values())
            .filter_map(|input| match input {
                InputConfig::Output(OutputRef { pipeline, .. }) => Some(pipeline.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Substitute `{{ name }}` placeholders; unknown names are an error
    pub fn render(&self, text: &str) -> Result<String> {
        let mut missing = None;
        let rendered = VARIABLE_PATTERN.replace_all(text, |caps: &regex::Captures| {
            match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    caps[0].to_string()
                }
            }
        });

        if let Some(name) = missing {
            bail!("Pipeline '{}' uses undefined variable '{}' in \"{}\"", self.name, name, text);
        }
        Ok(rendered.into_owned())
    }

    fn render_value(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.render(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.render_value(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Convert config to a Pipeline domain model
    ///
    /// Upstream pipelines must already be in `catalog`.
    pub fn to_pipeline(&self, registry: &FunctionRegistry, catalog: &Catalog) -> Result<Pipeline> {
        let mut pipeline = Pipeline::with_roots(
            &self.name,
            self.render(&self.input_root)?,
            self.render(&self.output_root)?,
        );

        for task in &self.tasks {
            let function = registry.get(&task.function).with_context(|| {
                format!(
                    "Task '{}' in pipeline '{}' uses unknown function '{}'",
                    task.name, self.name, task.function
                )
            })?;

            let mut inputs = Vec::with_capacity(task.inputs.len());
            for (param, input) in &task.inputs {
                let input = match input {
                    InputConfig::Path(PathInput { path }) => TaskInput::Path(self.render(path)?),
                    InputConfig::Task(TaskRef { task: dep }) => {
                        TaskInput::Reference(pipeline.get_task(dep)?)
                    }
                    InputConfig::Output(OutputRef { pipeline: owner, output }) => {
                        TaskInput::Reference(catalog.pipeline(owner)?.get_output(output)?)
                    }
                    InputConfig::Literal(LiteralInput { literal: value }) | InputConfig::Value(value) => {
                        TaskInput::Literal(self.render_value(value)?)
                    }
                };
                inputs.push((param.clone(), input));
            }

            pipeline.add_shared_task(&task.name, function, &self.render(&task.output_path)?, inputs)?;
        }

        pipeline.set_outputs(self.outputs.iter().map(|(k, v)| (k.clone(), v.clone())))?;
        Ok(pipeline)
    }
}
