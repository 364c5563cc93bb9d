//! Test: forcing and restricting the tasks of a run

use crate::helpers::*;
use data_pipeline::core::PipelineError;
use data_pipeline::execution::{RunOptions, SchedulingStrategy};
use data_pipeline::storage::Locator;
use serde_json::json;

/// Forcing one task recomputes it and nothing else
#[tokio::test]
async fn test_force_single_task() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = two_step_pipeline(&log);
    harness.run(&mut pipeline).await.unwrap();

    log.clear();
    harness
        .run_with(&mut pipeline, &RunOptions::default().force(["b"]))
        .await
        .unwrap();

    assert_eq!(log.calls(), vec!["b"]);
    assert_task_status(&pipeline, "a", "cached");
    assert_task_status(&pipeline, "b", "succeeded");
}

/// Running only a downstream task loads its inputs from storage
#[tokio::test]
async fn test_only_loads_unselected_inputs() {
    let harness = Harness::new().await;
    harness.store.insert(Locator::new("/a.ht"), json!("stored-a")).await;

    let log = CallLog::new();
    let mut pipeline = two_step_pipeline(&log);
    harness
        .run_with(&mut pipeline, &RunOptions::default().only(["b"]))
        .await
        .unwrap();

    assert_eq!(log.calls(), vec!["b"]);
    assert_task_status(&pipeline, "a", "pending");
    assert_eq!(pipeline.result("b"), Some(json!("stored-ab")));
    assert_eq!(pipeline.state.total_tasks, 1);
}

/// Running only a downstream task whose input was never produced fails
#[tokio::test]
async fn test_only_without_upstream_artifact() {
    let log = CallLog::new();
    let harness = Harness::with_strategy(SchedulingStrategy::Parallel).await;
    let mut pipeline = two_step_pipeline(&log);

    let err = harness
        .run_with(&mut pipeline, &RunOptions::default().only(["b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DependencyNotReady { ref dependency, .. } if dependency == "a"));
    assert_eq!(log.total(), 0);
}

/// Naming a task that does not exist is rejected before anything runs
#[tokio::test]
async fn test_unknown_task_names_rejected() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = two_step_pipeline(&log);

    let err = harness
        .run_with(&mut pipeline, &RunOptions::default().only(["annotate"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownTask { ref task, .. } if task == "annotate"));
    assert_eq!(log.total(), 0);
    assert!(harness.events().is_empty());
}
