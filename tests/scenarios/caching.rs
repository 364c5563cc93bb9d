//! Test: location-keyed caching and resumption

use crate::helpers::*;
use chrono::{Duration, Utc};
use data_pipeline::core::ExecutionStatus;
use data_pipeline::execution::{Freshness, RunOptions, SchedulingStrategy};
use data_pipeline::storage::Locator;
use serde_json::json;

/// Running the same pipeline twice against the same storage invokes nothing
/// the second time
#[tokio::test]
async fn test_second_run_is_fully_cached() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = two_step_pipeline(&log);

    harness.run(&mut pipeline).await.unwrap();
    assert_eq!(log.calls(), vec!["a", "b"]);
    assert_eq!(harness.artifact("/a.ht").await, Some(json!("a")));
    assert_eq!(harness.artifact("/b.ht").await, Some(json!("ab")));

    log.clear();
    harness.clear_events();
    harness.run(&mut pipeline).await.unwrap();

    assert_eq!(log.total(), 0);
    assert_eq!(harness.cached(), vec!["a", "b"]);
    assert_task_status(&pipeline, "a", "cached");
    assert_task_status(&pipeline, "b", "cached");
    assert_eq!(pipeline.result("b"), Some(json!("ab")));
    assert_eq!(pipeline.state.cached_tasks, 2);
    assert_eq!(pipeline.state.executed_tasks, 0);
    assert_eq!(pipeline.state.status, ExecutionStatus::Completed);
}

/// A new process over the same storage picks up where the last one stopped
#[tokio::test]
async fn test_new_instance_resumes_from_storage() {
    let first = Harness::new().await;
    first.store.insert(Locator::new("/a.ht"), json!("stored-a")).await;

    let log = CallLog::new();
    let harness = Harness::with_store(first.store.clone(), SchedulingStrategy::Sequential).await;
    let mut pipeline = two_step_pipeline(&log);
    harness.run(&mut pipeline).await.unwrap();

    // "a" was never invoked; "b" consumed the stored value
    assert_eq!(log.calls(), vec!["b"]);
    assert_eq!(pipeline.result("b"), Some(json!("stored-ab")));
    assert_task_status(&pipeline, "a", "cached");
    assert_task_status(&pipeline, "b", "succeeded");
}

/// Each run gets its own execution id and fresh statuses
#[tokio::test]
async fn test_rerun_resets_state() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = two_step_pipeline(&log);

    harness.run(&mut pipeline).await.unwrap();
    let first_run = pipeline.state.execution_id;
    harness.run(&mut pipeline).await.unwrap();

    assert_ne!(pipeline.state.execution_id, first_run);
    assert_eq!(pipeline.state.total_tasks, 2);
    assert_eq!(pipeline.state.progress(), 1.0);
}

/// Overwrite recomputes every task even though artifacts exist
#[tokio::test]
async fn test_overwrite_recomputes_everything() {
    let log = CallLog::new();
    let harness = Harness::new().await;
    let mut pipeline = two_step_pipeline(&log);

    harness.run(&mut pipeline).await.unwrap();
    log.clear();
    harness
        .run_with(&mut pipeline, &RunOptions::default().overwrite())
        .await
        .unwrap();

    assert_eq!(log.calls(), vec!["a", "b"]);
    assert_task_status(&pipeline, "a", "succeeded");
    assert_task_status(&pipeline, "b", "succeeded");
}

/// With input freshness enabled, an artifact older than its inputs is rebuilt
#[tokio::test]
async fn test_fresh_mode_rebuilds_stale_artifact() {
    let harness = Harness::new().await;
    let long_ago = Utc::now() - Duration::hours(2);
    harness
        .store
        .insert_at(Locator::new("/b.ht"), json!("stale-b"), long_ago)
        .await;
    harness.store.insert(Locator::new("/a.ht"), json!("new-a")).await;

    let log = CallLog::new();
    let mut pipeline = two_step_pipeline(&log);

    // Location-keyed: both artifacts exist, nothing runs
    harness.run(&mut pipeline).await.unwrap();
    assert_eq!(log.total(), 0);
    assert_eq!(pipeline.result("b"), Some(json!("stale-b")));

    // Freshness: "a" is newer than "b", so only "b" is recomputed
    harness
        .run_with(
            &mut pipeline,
            &RunOptions::default().with_freshness(Freshness::InputsNewer),
        )
        .await
        .unwrap();
    assert_eq!(log.calls(), vec!["b"]);
    assert_eq!(harness.artifact("/b.ht").await, Some(json!("new-ab")));
}

/// Independent tasks run in one batch under the parallel strategy and the
/// results are the same as a sequential run
#[tokio::test]
async fn test_parallel_strategy_matches_sequential() {
    let log = CallLog::new();
    let harness = Harness::with_strategy(SchedulingStrategy::LimitedParallel(2)).await;
    let mut pipeline = two_step_pipeline(&log);

    harness.run(&mut pipeline).await.unwrap();
    assert_eq!(log.calls(), vec!["a", "b"]);
    assert_eq!(pipeline.result("b"), Some(json!("ab")));

    log.clear();
    harness.run(&mut pipeline).await.unwrap();
    assert_eq!(log.total(), 0);
}
