//! Test: pipelines consuming each other's public outputs

use crate::helpers::*;
use data_pipeline::core::{Pipeline, PipelineError, TaskInput};
use data_pipeline::execution::RunOptions;
use data_pipeline::Catalog;
use serde_json::json;

fn variants_pipeline(log: &CallLog) -> Pipeline {
    let mut r = Pipeline::with_roots("r", "", "/staging/r");
    r.add_task("import", log.emit(json!(["chr1-55039974-G-T"])), "/import.ht", no_inputs())
        .unwrap();
    r.set_outputs([("variants", "import")]).unwrap();
    r
}

fn consumer_pipeline(log: &CallLog, r: &Pipeline) -> Pipeline {
    let mut q = Pipeline::with_roots("q", "", "/staging/q");
    q.add_task(
        "annotate",
        log.echo(),
        "/annotate.ht",
        [
            ("variants", TaskInput::from(r.get_output("variants").unwrap())),
            ("genome", TaskInput::literal("GRCh38")),
        ],
    )
    .unwrap();
    q
}

/// Q consumes R's "variants" output once R has executed
#[tokio::test]
async fn test_downstream_receives_upstream_value() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut r = variants_pipeline(&log);
    let mut q = consumer_pipeline(&log, &r);

    harness.run(&mut r).await.unwrap();
    harness.run(&mut q).await.unwrap();

    assert_eq!(log.calls(), vec!["import", "annotate"]);
    assert_eq!(
        q.result("annotate"),
        Some(json!({"variants": ["chr1-55039974-G-T"], "genome": "GRCh38"}))
    );
    assert!(harness.artifact("/staging/r/import.ht").await.is_some());
    assert!(harness.artifact("/staging/q/annotate.ht").await.is_some());
}

/// Running Q before R is an ordering error, and the reference stays
/// unresolvable until R runs
#[tokio::test]
async fn test_downstream_before_upstream_fails() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut r = variants_pipeline(&log);
    let mut q = consumer_pipeline(&log, &r);

    let reference = r.get_output("variants").unwrap();
    assert!(matches!(
        reference.resolve(),
        Err(PipelineError::UnresolvedReference { .. })
    ));

    let err = harness.run(&mut q).await.unwrap_err();
    match err {
        PipelineError::DependencyNotReady { task, pipeline, dependency } => {
            assert_eq!(task, "annotate");
            assert_eq!(pipeline, "r");
            assert_eq!(dependency, "import");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.total(), 0);
    assert_task_status(&q, "annotate", "failed");

    harness.run(&mut r).await.unwrap();
    assert_eq!(reference.resolve().unwrap(), json!(["chr1-55039974-G-T"]));
    harness.run(&mut q).await.unwrap();
}

/// Private tasks of another pipeline cannot be wired in directly
#[test]
fn test_private_task_rejected() {
    let log = CallLog::new();
    let r = variants_pipeline(&log);
    let mut q = Pipeline::new("q");

    let err = q
        .add_task(
            "annotate",
            log.echo(),
            "/annotate.ht",
            [("variants", TaskInput::from(r.get_task("import").unwrap()))],
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::ForeignTaskReference { .. }));
}

/// The catalog runs upstream pipelines before the requested one
#[tokio::test]
async fn test_catalog_runs_upstream_first() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let r = variants_pipeline(&log);
    let q = consumer_pipeline(&log, &r);

    let mut catalog = Catalog::new();
    catalog.add(q).unwrap();
    catalog.add(r).unwrap();
    assert_eq!(catalog.run_order("q").unwrap(), vec!["r", "q"]);

    catalog
        .run("q", &harness.engine, &RunOptions::default().force(["annotate"]))
        .await
        .unwrap();
    assert_eq!(log.calls(), vec!["import", "annotate"]);
    assert!(catalog.pipeline("r").unwrap().is_complete());

    // Upstream already complete; only the target runs again
    log.clear();
    catalog.run("q", &harness.engine, &RunOptions::default()).await.unwrap();
    assert_eq!(log.total(), 0);
    assert_task_status(catalog.pipeline("q").unwrap(), "annotate", "cached");
}
