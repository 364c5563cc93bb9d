//! Named task functions available to YAML pipeline definitions

use crate::core::{TaskArgs, TaskFunction};
use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Function name -> implementation
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn TaskFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the generic functions shipped with the binary
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("read_json", read_json);
        registry.register("collect", collect);
        registry.register("pick", pick);
        registry
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: TaskFunction + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Parse a local JSON file given as the `path` input
fn read_json(args: &TaskArgs) -> Result<Value> {
    let locator = args.str("path")?;
    let path = match locator.split_once("://") {
        Some(("file", rest)) => rest,
        Some((scheme, _)) => bail!("read_json cannot read '{}' locators: {}", scheme, locator),
        None => locator,
    };

    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path))
}

/// Every input, as one object
fn collect(args: &TaskArgs) -> Result<Value> {
    Ok(args.to_value())
}

/// Field of the `from` input named by the dotted `field` input
fn pick(args: &TaskArgs) -> Result<Value> {
    let source = args.require("from")?;
    let field = args.str("field")?;

    field
        .split('.')
        .try_fold(source, |value, key| {
            let next = match value {
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => value.get(key),
            };
            next.ok_or_else(|| anyhow!("field '{}' not found (missing '{}')", field, key))
        })
        .cloned()
}
