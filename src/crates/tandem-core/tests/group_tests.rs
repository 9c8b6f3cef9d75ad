mod common;

use common::{recording_add, recording_callback, registry, sleep, Harness, Journal};
use futures::TryStreamExt;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tandem_core::{compose_group, compose_pipeline, Child, CompositionError, Group, GroupResult};

#[tokio::test]
async fn test_children_run_in_parallel() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    let group = Group::new((0..5).map(|_| sleep.message(vec![json!(100)])));
    let started = Instant::now();
    group.run(&harness.broker, None).await.unwrap();

    let results: Vec<GroupResult> = group
        .get_results(&harness.results, true, Some(Duration::from_secs(2)))
        .try_collect()
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|result| result.as_value() == Some(&Value::Null)));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_group_of_groups_keeps_its_shape() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    let group = Group::new(
        (0..3).map(|_| Group::new([sleep.message(vec![json!(20)]), sleep.message(vec![json!(20)])])),
    );
    group.run(&harness.broker, None).await.unwrap();
    group
        .wait(&harness.results, Some(Duration::from_secs(2)))
        .await
        .unwrap();

    let results: Vec<GroupResult> = group
        .get_results(&harness.results, false, None)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results
        .iter()
        .all(|inner| inner.as_group().map(<[GroupResult]>::len) == Some(2)));
    assert_eq!(
        GroupResult::Group(results).to_value(),
        json!([[null, null], [null, null], [null, null]])
    );

    worker.shutdown().await;
}

#[tokio::test]
async fn test_pipeline_children_report_their_last_result() {
    let harness = Harness::new();
    let journal = Journal::default();
    let add = recording_add(&journal);
    let worker = harness.start(registry([add.clone()]));

    let group = Group::new([
        Child::from(compose_pipeline([add.message(vec![json!(1)]), add.message(vec![json!(2)])]).unwrap()),
        Child::from(add.message(vec![json!(7)])),
    ]);
    group.run(&harness.broker, None).await.unwrap();

    let results: Vec<Value> = group
        .get_results(&harness.results, true, Some(Duration::from_secs(2)))
        .map_ok(|result| result.to_value())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(results, vec![json!(3), json!(7)]);

    worker.shutdown().await;
}

#[tokio::test]
async fn test_completed_count_is_monotonic() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    let group = Group::new([10, 40, 70, 100].map(|millis| sleep.message(vec![json!(millis)])));
    group.run(&harness.broker, None).await.unwrap();

    let mut observed = Vec::new();
    for _ in 0..200 {
        observed.push(group.completed_count(&harness.results).await.unwrap());
        if group.completed(&harness.results).await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(group.completed(&harness.results).await.unwrap());
    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(group.completed_count(&harness.results).await.unwrap(), group.len());

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_without_a_worker() {
    let harness = Harness::new();
    let group = Group::new([sleep().message(vec![json!(10)])]);
    group.run(&harness.broker, None).await.unwrap();

    let err = group
        .wait(&harness.results, Some(Duration::from_millis(250)))
        .await
        .unwrap_err();

    assert!(matches!(err, CompositionError::ResultTimeout { .. }));
}

#[tokio::test]
async fn test_callback_fires_once_after_every_child() {
    let harness = Harness::new();
    let journal = Journal::default();
    let add = recording_add(&journal);
    let finalize = recording_callback(&journal);
    let worker = harness.start(registry([add.clone(), finalize.clone()]));

    let group = compose_group((0..6).map(|i| add.message(vec![json!(i)])), Some(finalize.message(vec![])));
    group
        .run(&harness.broker, Some(&harness.coordinator))
        .await
        .unwrap();

    assert!(journal.wait_for("callback", 1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(journal.count("callback"), 1);
    let callback = journal.ticks("callback")[0];
    let children = journal.ticks("child");
    assert_eq!(children.len(), 6);
    assert!(children.iter().all(|&tick| tick < callback));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_callback_waits_for_pipeline_children() {
    let harness = Harness::new();
    let journal = Journal::default();
    let add = recording_add(&journal);
    let finalize = recording_callback(&journal);
    let worker = harness.start(registry([add.clone(), finalize.clone()]));

    let group = Group::new([
        Child::from(
            compose_pipeline([add.message(vec![json!(1)]), add.message(vec![json!(2)]), add.message(vec![json!(3)])])
                .unwrap(),
        ),
        Child::from(compose_pipeline([add.message(vec![json!(4)]), add.message(vec![json!(5)])]).unwrap()),
        Child::from(add.message(vec![json!(6)])),
    ])
    .with_completion_callback(finalize.message(vec![]))
    .unwrap();
    group
        .run(&harness.broker, Some(&harness.coordinator))
        .await
        .unwrap();

    assert!(journal.wait_for("callback", 1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(journal.count("callback"), 1);
    let callback = journal.ticks("callback")[0];
    let stages = journal.ticks("child");
    assert_eq!(stages.len(), 6);
    assert!(stages.iter().all(|&tick| tick < callback));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_nested_group_callbacks_fire_once_each() {
    let harness = Harness::new();
    let journal = Journal::default();
    let add = recording_add(&journal);
    let finalize = recording_callback(&journal);
    let worker = harness.start(registry([add.clone(), finalize.clone()]));

    let inner = compose_group(
        [add.message(vec![json!(1)]), add.message(vec![json!(2)])],
        Some(finalize.message(vec![json!("inner")])),
    );
    let outer = compose_group(
        [Child::from(inner), Child::from(add.message(vec![json!(3)]))],
        Some(finalize.message(vec![json!("outer")])),
    );
    outer
        .run(&harness.broker, Some(&harness.coordinator))
        .await
        .unwrap();

    assert!(journal.wait_for("callback", 2, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(journal.count("callback"), 2);
    // the outer callback comes last
    let last_child = journal.ticks("child").into_iter().max().unwrap();
    let last_callback = journal.ticks("callback").into_iter().max().unwrap();
    assert!(last_callback > last_child);

    worker.shutdown().await;
}

#[tokio::test]
async fn test_callback_without_coordinator_is_rejected_before_dispatch() {
    let harness = Harness::new();
    let journal = Journal::default();
    let add = recording_add(&journal);
    let group = compose_group(
        [add.message(vec![json!(1)]), add.message(vec![json!(2)])],
        Some(recording_callback(&journal).message(vec![])),
    );

    let err = group.run(&harness.broker, None).await.unwrap_err();

    assert!(matches!(err, CompositionError::Configuration(_)));
    assert_eq!(harness.broker.enqueued_count(), 0);
    assert!(harness.counters.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_result_stream_shares_one_budget_across_children() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    // each child finishes in under a second on its own, but the second one
    // is only ready 1.4s after dispatch
    let group = Group::new([
        Child::from(compose_pipeline([sleep.message(vec![json!(300)]), sleep.message(vec![json!(300)])]).unwrap()),
        Child::from(compose_pipeline([sleep.message(vec![json!(700)]), sleep.message(vec![json!(700)])]).unwrap()),
    ]);
    group.run(&harness.broker, None).await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome: Result<Vec<GroupResult>, _> = group
        .get_results(&harness.results, true, Some(Duration::from_secs(1)))
        .try_collect()
        .await;

    assert!(outcome.unwrap_err().is_timeout());
    assert!(started.elapsed() <= Duration::from_secs(1));

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_results_landing_late_in_the_budget_are_returned() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    let group = Group::new([sleep.message(vec![json!(700)])]);
    group.run(&harness.broker, None).await.unwrap();

    let results: Vec<Value> = group
        .get_results(&harness.results, true, Some(Duration::from_secs(1)))
        .map_ok(|result| result.to_value())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(results, vec![Value::Null]);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wait_succeeds_when_completion_lands_late_in_the_budget() {
    let harness = Harness::new();
    let sleep = sleep();
    let worker = harness.start(registry([sleep.clone()]));

    let group = Group::new([sleep.message(vec![json!(700)]), sleep.message(vec![json!(650)])]);
    group.run(&harness.broker, None).await.unwrap();

    group
        .wait(&harness.results, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(group.completed(&harness.results).await.unwrap());

    worker.shutdown().await;
}
