//! Test: pipelines declared in YAML, run against the local filesystem

use data_pipeline::catalog::{Catalog, FunctionRegistry};
use data_pipeline::core::{ExecutionStatus, PipelineConfig};
use data_pipeline::execution::{ExecutionEngine, RunOptions, SchedulingStrategy};
use data_pipeline::storage::LocalArtifactStore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GENES: &str = r#"
name: genes
input_root: "{{ root }}/raw"
output_root: "{{ root }}/staging"
variables:
  root: /var/lib/pipelines
tasks:
  - name: import_genes
    function: read_json
    output_path: /genes/genes.ht
    inputs:
      path: { path: genes.json }
  - name: canonical
    function: pick
    output_path: /genes/canonical.ht
    inputs:
      from: { task: import_genes }
      field: "genes.0.symbol"
outputs:
  canonical_gene: canonical
"#;

const BROWSER: &str = r#"
name: browser
output_root: "{{ root }}/staging"
variables:
  root: /var/lib/pipelines
tasks:
  - name: prepare
    function: collect
    output_path: /browser/gene.ht
    inputs:
      gene: { pipeline: genes, output: canonical_gene }
      reference_genome: "GRCh38"
"#;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("pipeline-yaml-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(root.join("raw")).unwrap();
    std::fs::write(
        root.join("raw/genes.json"),
        r#"{"genes": [{"symbol": "PCSK9"}, {"symbol": "LDLR"}]}"#,
    )
    .unwrap();
    root
}

fn load(yaml: &str, root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::from_yaml(yaml).unwrap();
    config
        .variables
        .insert("root".to_string(), root.to_string_lossy().to_string());
    config
}

fn read_artifact(path: PathBuf) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_yaml_catalog_end_to_end() {
    let root = temp_root();
    let configs = vec![load(BROWSER, &root), load(GENES, &root)];
    let mut catalog = Catalog::from_configs(configs, &FunctionRegistry::with_builtins()).unwrap();
    assert_eq!(catalog.run_order("browser").unwrap(), vec!["genes", "browser"]);

    let engine = ExecutionEngine::new(Arc::new(LocalArtifactStore::new()), SchedulingStrategy::Parallel);
    catalog.run("browser", &engine, &RunOptions::default()).await.unwrap();

    let staging = root.join("staging");
    assert_eq!(read_artifact(staging.join("genes/canonical.ht")), json!("PCSK9"));
    assert_eq!(
        read_artifact(staging.join("browser/gene.ht")),
        json!({"gene": "PCSK9", "reference_genome": "GRCh38"})
    );

    let browser = catalog.pipeline("browser").unwrap();
    assert_eq!(browser.state.status, ExecutionStatus::Completed);
    assert_eq!(browser.state.executed_tasks, 1);

    std::fs::remove_dir_all(&root).ok();
}

/// A second process over the same directories recomputes nothing
#[tokio::test]
async fn test_yaml_rerun_is_cached() {
    let root = temp_root();
    let registry = FunctionRegistry::with_builtins();
    let engine = ExecutionEngine::new(Arc::new(LocalArtifactStore::new()), SchedulingStrategy::Sequential);

    let mut first = Catalog::from_configs(vec![load(GENES, &root)], &registry).unwrap();
    first.run("genes", &engine, &RunOptions::default()).await.unwrap();

    // Removing the raw input proves the second run never reads it
    std::fs::remove_file(root.join("raw/genes.json")).unwrap();

    let mut second = Catalog::from_configs(vec![load(GENES, &root)], &registry).unwrap();
    second.run("genes", &engine, &RunOptions::default()).await.unwrap();

    let genes = second.pipeline("genes").unwrap();
    assert_eq!(genes.state.cached_tasks, 2);
    assert_eq!(genes.result("canonical"), Some(json!("PCSK9")));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn test_unknown_function_rejected() {
    let yaml = r#"
name: genes
tasks:
  - name: import_genes
    function: import_gencode
    output_path: /genes.ht
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let err = Catalog::from_configs(vec![config], &FunctionRegistry::with_builtins()).unwrap_err();
    assert!(err.to_string().contains("import_gencode"));
}
