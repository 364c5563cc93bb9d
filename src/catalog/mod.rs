//! Catalog of pipelines and the meta-graph formed by their public outputs

pub mod functions;

pub use functions::FunctionRegistry;

use crate::core::{Pipeline, PipelineConfig, PipelineError, PipelineResult};
use crate::execution::{ExecutionEngine, RunOptions};
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Pipelines owned by name, in the order they were added
#[derive(Debug, Default)]
pub struct Catalog {
    pipelines: Vec<Pipeline>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from YAML definitions, adding upstream pipelines first
    pub fn from_configs(configs: Vec<PipelineConfig>, registry: &FunctionRegistry) -> Result<Self> {
        let mut catalog = Catalog::new();
        let known: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();

        for config in &configs {
            for upstream in config.referenced_pipelines() {
                if !known.contains(upstream) {
                    bail!(
                        "Pipeline '{}' consumes outputs of unknown pipeline '{}'",
                        config.name,
                        upstream
                    );
                }
            }
        }

        let mut pending: Vec<&PipelineConfig> = configs.iter().collect();
        while !pending.is_empty() {
            let (ready, blocked): (Vec<&PipelineConfig>, Vec<&PipelineConfig>) =
                pending.into_iter().partition(|config| {
                    config
                        .referenced_pipelines()
                        .iter()
                        .all(|upstream| catalog.contains(upstream))
                });

            if ready.is_empty() {
                let names: Vec<&str> = blocked.iter().map(|c| c.name.as_str()).collect();
                bail!("Pipelines consume each other's outputs in a cycle: {}", names.join(", "));
            }

            for config in ready {
                let pipeline = config.to_pipeline(registry, &catalog)?;
                catalog.add(pipeline)?;
            }
            pending = blocked;
        }

        Ok(catalog)
    }

    pub fn add(&mut self, pipeline: Pipeline) -> PipelineResult<()> {
        if self.index.contains_key(&pipeline.name) {
            return Err(PipelineError::DuplicatePipeline(pipeline.name.clone()));
        }
        self.index.insert(pipeline.name.clone(), self.pipelines.len());
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn pipeline(&self, name: &str) -> PipelineResult<&Pipeline> {
        self.index
            .get(name)
            .map(|&i| &self.pipelines[i])
            .ok_or_else(|| PipelineError::UnknownPipeline(name.to_string()))
    }

    pub fn pipeline_mut(&mut self, name: &str) -> PipelineResult<&mut Pipeline> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.pipelines[i]),
            None => Err(PipelineError::UnknownPipeline(name.to_string())),
        }
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Pipelines whose outputs `name` consumes directly
    pub fn upstream(&self, name: &str) -> PipelineResult<Vec<String>> {
        let pipeline = self.pipeline(name)?;
        pipeline
            .upstream_pipelines()
            .into_iter()
            .map(|(id, owner)| {
                let known = self.pipeline(&owner).is_ok_and(|p| p.id() == id);
                if known {
                    Ok(owner)
                } else {
                    Err(PipelineError::UnknownPipeline(owner))
                }
            })
            .collect()
    }

    /// `name` and everything it transitively consumes, upstream first
    pub fn run_order(&self, name: &str) -> PipelineResult<Vec<String>> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        self.visit(name, &mut visiting, &mut order)?;
        Ok(order)
    }

    fn visit(&self, name: &str, visiting: &mut Vec<String>, order: &mut Vec<String>) -> PipelineResult<()> {
        if order.iter().any(|done| done == name) {
            return Ok(());
        }
        if let Some(start) = visiting.iter().position(|v| v == name) {
            return Err(PipelineError::CyclicDependency {
                pipeline: name.to_string(),
                members: visiting[start..].to_vec(),
            });
        }

        visiting.push(name.to_string());
        for upstream in self.upstream(name)? {
            self.visit(&upstream, visiting, order)?;
        }
        visiting.pop();
        order.push(name.to_string());
        Ok(())
    }

    /// Run `name`, first running any upstream pipeline that has not completed
    ///
    /// Upstream pipelines run with default options (carrying over the
    /// freshness mode), so existing artifacts satisfy them.
    pub async fn run(&mut self, name: &str, engine: &ExecutionEngine, options: &RunOptions) -> PipelineResult<()> {
        let order = self.run_order(name)?;
        let upstream_options = RunOptions::default().with_freshness(options.freshness);

        for upstream in order.iter().filter(|p| p.as_str() != name) {
            let pipeline = self.pipeline_mut(upstream)?;
            if pipeline.is_complete() {
                continue;
            }
            info!("Running upstream pipeline {} for {}", upstream, name);
            engine.execute(pipeline, &upstream_options).await?;
        }

        engine.execute(self.pipeline_mut(name)?, options).await
    }
}
