//! Attempt driver scenarios: clean runs, incremental adds, partial
//! failures, window continuity, the failure threshold, and stop signals.

use std::sync::Arc;

use trawl_application::indexing::{CallbackState, RunIndexingOptions, run_indexing};
use trawl_domain::entities::{ConnectorFailure, IndexAttemptStatus, NewIndexAttempt};
use trawl_domain::ports::NoopHeartbeat;
use trawl_domain::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId};

use crate::utils::{TestWorld, document_with_time};

async fn new_attempt(world: &TestWorld, from_beginning: bool) -> IndexAttemptId {
    world
        .ctx
        .repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: CcPairId::new(1),
            search_settings_id: SearchSettingsId::new(1),
            from_beginning,
        })
        .await
        .expect("create attempt")
}

async fn run(world: &TestWorld, attempt: IndexAttemptId) -> trawl_domain::error::Result<()> {
    run_indexing(
        &world.ctx,
        &world.services,
        attempt,
        Arc::new(NoopHeartbeat),
        &RunIndexingOptions::default(),
    )
    .await
}

#[tokio::test]
async fn clean_run_marks_success_and_advances_the_pair() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world.connector.set_docs(vec![
        document_with_time("D1", "alpha beta", Some(1_704_067_200)),
        document_with_time("D2", "gamma delta", Some(1_704_067_200)),
    ]);

    let attempt_id = new_attempt(&world, false).await;
    run(&world, attempt_id).await.expect("run");

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Success);
    assert_eq!(attempt.total_docs_indexed, 2);
    assert!(attempt.poll_range_end.is_some());

    let pair = world
        .ctx
        .repos
        .cc_pairs
        .get(CcPairId::new(1))
        .await
        .expect("get")
        .expect("pair");
    assert_eq!(pair.last_successful_index_time, attempt.poll_range_end);

    assert!(world.search_index.contains("D1"));
    assert!(world.search_index.contains("D2"));
}

#[tokio::test]
async fn second_run_skips_unchanged_documents() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world.connector.set_docs(vec![
        document_with_time("D1", "alpha beta", Some(1_704_067_200)),
        document_with_time("D2", "gamma delta", Some(1_704_067_200)),
    ]);

    let first = new_attempt(&world, false).await;
    run(&world, first).await.expect("run");
    let d1_writes = world.search_index.write_count("D1");

    let second = new_attempt(&world, false).await;
    run(&world, second).await.expect("run");

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(second)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Success);
    // no re-upserts for unchanged content
    assert_eq!(world.search_index.write_count("D1"), d1_writes);
    assert_eq!(attempt.new_docs_indexed, 0);
}

#[tokio::test]
async fn incremental_add_touches_only_the_new_document() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world.connector.set_docs(vec![
        document_with_time("D1", "alpha beta", Some(1_704_067_200)),
        document_with_time("D2", "gamma delta", Some(1_704_067_200)),
    ]);
    run(&world, new_attempt(&world, false).await)
        .await
        .expect("run");
    let d1_writes = world.search_index.write_count("D1");
    let d2_writes = world.search_index.write_count("D2");
    let pair_before = world
        .ctx
        .repos
        .cc_pairs
        .get(CcPairId::new(1))
        .await
        .expect("get")
        .expect("pair");

    world.connector.set_docs(vec![
        document_with_time("D1", "alpha beta", Some(1_704_067_200)),
        document_with_time("D2", "gamma delta", Some(1_704_067_200)),
        document_with_time("D3", "epsilon zeta", Some(1_704_070_000)),
    ]);
    let attempt_id = new_attempt(&world, false).await;
    run(&world, attempt_id).await.expect("run");

    assert!(world.search_index.contains("D3"));
    assert_eq!(world.search_index.write_count("D1"), d1_writes);
    assert_eq!(world.search_index.write_count("D2"), d2_writes);

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.new_docs_indexed, 1);

    let pair = world
        .ctx
        .repos
        .cc_pairs
        .get(CcPairId::new(1))
        .await
        .expect("get")
        .expect("pair");
    assert!(pair.last_successful_index_time >= pair_before.last_successful_index_time);
}

#[tokio::test]
async fn partial_failure_records_and_later_success_resolves() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world.embedder.poison("poison");
    world.connector.set_docs(vec![
        document_with_time("D1", "clean one", Some(100)),
        document_with_time("D2", "poison here", Some(100)),
        document_with_time("D3", "clean two", Some(100)),
    ]);

    let first = new_attempt(&world, false).await;
    run(&world, first).await.expect("run");

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(first)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::PartialSuccess);
    assert!(world.search_index.contains("D1"));
    assert!(world.search_index.contains("D3"));
    assert!(!world.search_index.contains("D2"));

    let unresolved = world
        .ctx
        .repos
        .index_attempts
        .unresolved_errors(CcPairId::new(1))
        .await
        .expect("errors");
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].document_id.as_deref(), Some("D2"));

    // the model recovers; D2 changed upstream so it is pulled again
    world.embedder.heal();
    world.connector.set_docs(vec![document_with_time(
        "D2",
        "poison here",
        Some(200),
    )]);
    let second = new_attempt(&world, false).await;
    run(&world, second).await.expect("run");

    assert!(world.search_index.contains("D2"));
    let unresolved = world
        .ctx
        .repos
        .index_attempts
        .unresolved_errors(CcPairId::new(1))
        .await
        .expect("errors");
    assert!(unresolved.is_empty());
}

#[tokio::test]
async fn failed_attempts_pin_the_next_window_end() {
    let world = TestWorld::new();
    world.seed_default_pair();
    // connector-level failures with no documents trip the threshold
    for i in 0..5 {
        world
            .connector
            .push_failure(ConnectorFailure::for_entity(format!("e{i}"), "unreachable"));
    }

    let first = new_attempt(&world, false).await;
    assert!(run(&world, first).await.is_err());
    let failed = world
        .ctx
        .repos
        .index_attempts
        .get(first)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(failed.status, IndexAttemptStatus::Failed);
    let pinned_end = failed.poll_range_end.expect("window end");

    // no window skip: the retry reuses the failed attempt's end
    world.connector.failures.lock().expect("failures").clear();
    let second = new_attempt(&world, false).await;
    run(&world, second).await.expect("run");
    let retried = world
        .ctx
        .repos
        .index_attempts
        .get(second)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(retried.poll_range_end, Some(pinned_end));
}

#[tokio::test]
async fn failure_threshold_aborts_the_run() {
    let world = TestWorld::new();
    world.seed_default_pair();
    for i in 0..6 {
        world
            .connector
            .push_failure(ConnectorFailure::for_entity(format!("e{i}"), "boom"));
    }

    let attempt_id = new_attempt(&world, false).await;
    let err = run(&world, attempt_id).await.expect_err("must abort");
    assert!(err.to_string().contains("too many errors"));

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Failed);
    // aborted before consuming the whole failure script
    let unresolved = world
        .ctx
        .repos
        .index_attempts
        .unresolved_errors(CcPairId::new(1))
        .await
        .expect("errors");
    assert!(unresolved.len() >= 4);
    assert!(unresolved.len() < 6);
}

#[tokio::test]
async fn stop_signal_cancels_the_attempt() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world
        .connector
        .set_docs(vec![document_with_time("D1", "alpha", Some(100))]);

    let heartbeat = Arc::new(CallbackState::new());
    heartbeat.request_stop();

    let attempt_id = new_attempt(&world, false).await;
    let result = run_indexing(
        &world.ctx,
        &world.services,
        attempt_id,
        heartbeat,
        &RunIndexingOptions::default(),
    )
    .await;
    assert!(result.is_err());

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Canceled);
    assert_eq!(
        attempt.error_msg.as_deref(),
        Some("Connector stop signal detected")
    );
    assert!(!world.search_index.contains("D1"));
}
