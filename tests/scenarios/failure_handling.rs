//! Test: Failure Handling - fail fast, persist nothing for the failed task

use crate::helpers::*;
use data_pipeline::core::{ExecutionStatus, Pipeline, PipelineError, TaskArgs, TaskInput};
use data_pipeline::execution::{ExecutionEngine, RunOptions, SchedulingStrategy};
use data_pipeline::storage::{LocalArtifactStore, Locator};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// C fails; D consumes C and must never be invoked
fn failing_chain(log: &CallLog) -> Pipeline {
    let mut pipeline = Pipeline::new("p");
    pipeline
        .add_task("c", log.failing("disk full"), "/c.ht", no_inputs())
        .unwrap();
    let c = pipeline.get_task("c").unwrap();
    pipeline
        .add_task("d", log.append("d"), "/d.ht", [("input", TaskInput::from(c))])
        .unwrap();
    pipeline
}

#[tokio::test]
async fn test_failure_stops_downstream() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = failing_chain(&log);

    let err = harness.run(&mut pipeline).await.unwrap_err();

    assert!(matches!(err, PipelineError::Execution { ref task, .. } if task == "c"));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(log.calls(), vec!["c"]);
    assert!(harness.artifact("/c.ht").await.is_none());
    assert!(harness.artifact("/d.ht").await.is_none());

    assert_task_failed_with(&pipeline, "c", "disk full");
    assert_task_status(&pipeline, "d", "pending");
    assert_eq!(pipeline.state.status, ExecutionStatus::Failed);
    assert_eq!(pipeline.state.failed_tasks, 1);
    assert!(pipeline.has_failed());
    assert!(!pipeline.is_complete());
}

/// Tasks completed before the failure keep their artifacts, so a rerun
/// resumes at the failed task
#[tokio::test]
async fn test_rerun_after_failure_resumes() {
    let log = CallLog::new();
    let healthy = Arc::new(AtomicBool::new(false));

    let mut pipeline = Pipeline::new("p");
    pipeline
        .add_task("a", log.emit(json!("a")), "/a.ht", no_inputs())
        .unwrap();
    let a = pipeline.get_task("a").unwrap();
    let flag = healthy.clone();
    let flaky_log = log.clone();
    pipeline
        .add_task(
            "b",
            move |args: &TaskArgs| -> anyhow::Result<Value> {
                flaky_log.record(args.task_name());
                if !flag.load(Ordering::SeqCst) {
                    anyhow::bail!("preemptible worker lost");
                }
                Ok(json!(format!("{}b", args.str("input")?)))
            },
            "/b.ht",
            [("input", TaskInput::from(a))],
        )
        .unwrap();

    let harness = Harness::new().await;
    assert!(harness.run(&mut pipeline).await.is_err());
    assert_eq!(harness.artifact("/a.ht").await, Some(json!("a")));

    healthy.store(true, Ordering::SeqCst);
    log.clear();
    harness.run(&mut pipeline).await.unwrap();

    assert_eq!(log.calls(), vec!["b"]);
    assert_task_status(&pipeline, "a", "cached");
    assert_eq!(pipeline.result("b"), Some(json!("ab")));
}

/// In a parallel batch the sibling of a failed task still finishes and
/// persists, but nothing after the batch starts
#[tokio::test]
async fn test_parallel_failure_lets_batch_finish() {
    let log = CallLog::new();
    let harness = Harness::with_strategy(SchedulingStrategy::Parallel).await;

    let mut pipeline = Pipeline::new("p");
    pipeline
        .add_task("x", log.failing("bad input"), "/x.ht", no_inputs())
        .unwrap();
    pipeline
        .add_task("y", log.emit(json!("y")), "/y.ht", no_inputs())
        .unwrap();
    let y = pipeline.get_task("y").unwrap();
    pipeline
        .add_task("z", log.append("z"), "/z.ht", [("input", TaskInput::from(y))])
        .unwrap();

    let err = harness.run(&mut pipeline).await.unwrap_err();

    assert_eq!(err.task(), Some("x"));
    assert_eq!(log.count("z"), 0);
    assert_eq!(harness.artifact("/y.ht").await, Some(json!("y")));
    assert_task_status(&pipeline, "y", "succeeded");
    assert_task_status(&pipeline, "z", "pending");
}

/// An unreadable artifact is reported, not silently recomputed
#[tokio::test]
async fn test_corrupt_artifact_is_cache_inconsistency() {
    let root = std::env::temp_dir().join(format!("pipeline-corrupt-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("a.ht"), "{ not json").unwrap();

    let log = CallLog::new();
    let engine = ExecutionEngine::new(Arc::new(LocalArtifactStore::new()), SchedulingStrategy::Sequential);
    let mut pipeline = Pipeline::with_roots("p", "", root.to_string_lossy().to_string());
    pipeline
        .add_task("a", log.emit(json!("a")), "/a.ht", no_inputs())
        .unwrap();

    let err = engine
        .execute(&mut pipeline, &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        PipelineError::CacheInconsistency { task, locator, .. } => {
            assert_eq!(task, "a");
            assert_eq!(locator, Locator::join(&root.to_string_lossy(), "/a.ht").to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.total(), 0);
    assert_task_status(&pipeline, "a", "failed");

    std::fs::remove_dir_all(&root).ok();
}
