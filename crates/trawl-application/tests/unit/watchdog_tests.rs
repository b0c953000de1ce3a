//! Watchdog supervision: exit classification, termination, policies.

use std::time::Duration;

use trawl_application::coordination::IndexingFence;
use trawl_application::indexing::{ExitCodePolicy, IndexingWatchdog, WatchdogTerminalStatus};
use trawl_application::tasks::IndexingTaskPayload;
use trawl_domain::entities::{IndexAttemptStatus, NewIndexAttempt};
use trawl_domain::ports::ProcessExit;
use trawl_domain::value_objects::IndexAttemptId;

use crate::utils::TestWorld;

async fn seeded_payload(world: &TestWorld) -> (IndexingTaskPayload, IndexAttemptId) {
    let (pair_id, settings_id) = world.seed_default_pair();
    let attempt_id = world
        .ctx
        .repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: pair_id,
            search_settings_id: settings_id,
            from_beginning: false,
        })
        .await
        .expect("create");
    world
        .ctx
        .repos
        .index_attempts
        .transition_to_in_progress(attempt_id)
        .await
        .expect("transition");
    (
        IndexingTaskPayload {
            cc_pair_id: pair_id,
            search_settings_id: settings_id,
            index_attempt_id: attempt_id,
        },
        attempt_id,
    )
}

fn watchdog(policy: ExitCodePolicy) -> IndexingWatchdog {
    IndexingWatchdog::new(policy).with_poll_period(Duration::from_millis(10))
}

async fn attempt_status(world: &TestWorld, id: IndexAttemptId) -> IndexAttemptStatus {
    world
        .ctx
        .repos
        .index_attempts
        .get(id)
        .await
        .expect("get")
        .expect("attempt")
        .status
}

#[tokio::test]
async fn clean_exit_reports_success() {
    let world = TestWorld::new();
    let (payload, _) = seeded_payload(&world).await;
    world.process.finish(ProcessExit::Code(0));

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::Succeeded);
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn sigkill_is_classified_and_recorded() {
    let world = TestWorld::new();
    let (payload, attempt_id) = seeded_payload(&world).await;
    world.process.finish(ProcessExit::Signal(9));

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::ProcessSignalSigkill);
    assert_eq!(outcome.exit_code, Some(-9));

    assert_eq!(
        attempt_status(&world, attempt_id).await,
        IndexAttemptStatus::Failed
    );
    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert!(attempt.error_msg.unwrap_or_default().contains("-9"));
}

#[tokio::test]
async fn coded_exits_map_to_terminal_statuses() {
    let world = TestWorld::new();
    let (payload, attempt_id) = seeded_payload(&world).await;
    world.process.finish(ProcessExit::Code(253));

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::TaskAlreadyRunning);
    assert_eq!(
        attempt_status(&world, attempt_id).await,
        IndexAttemptStatus::Failed
    );
}

#[tokio::test]
async fn oom_exit_is_classified() {
    let world = TestWorld::new();
    let (payload, _) = seeded_payload(&world).await;
    world.process.finish(ProcessExit::Code(137));

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::OutOfMemory);
}

#[tokio::test]
async fn terminate_signal_kills_child_and_cancels() {
    let world = TestWorld::new();
    let (payload, attempt_id) = seeded_payload(&world).await;
    let fence = IndexingFence::new(
        world.ctx.kv.clone(),
        payload.cc_pair_id,
        payload.search_settings_id,
    );
    // operator requests termination before the child ever finishes
    fence.set_terminate("task-1").await.expect("terminate");

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::TerminatedBySignal);
    assert!(*world.process.killed.lock().expect("killed"));

    assert_eq!(
        attempt_status(&world, attempt_id).await,
        IndexAttemptStatus::Canceled
    );
    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(
        attempt.error_msg.as_deref(),
        Some("Connector termination signal detected")
    );
    // the watchdog heartbeat is cleared on the way out
    assert!(!fence.watchdog_signaled().await.expect("watchdog"));
}

#[tokio::test]
async fn spawn_failure_is_terminal() {
    let world = TestWorld::new();
    let (payload, _) = seeded_payload(&world).await;
    *world.spawner.fail_spawn.lock().expect("fail") = true;

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::SpawnFailed);
}

#[tokio::test]
async fn strict_policy_honors_nonzero_exit_despite_ok_completion() {
    let world = TestWorld::new();
    let (payload, attempt_id) = seeded_payload(&world).await;
    let fence = IndexingFence::new(
        world.ctx.kv.clone(),
        payload.cc_pair_id,
        payload.search_settings_id,
    );
    fence.set_generator_complete(200).await.expect("complete");
    world.process.finish(ProcessExit::Code(1));

    let outcome = watchdog(ExitCodePolicy::Strict)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::Undefined);
    assert_eq!(
        attempt_status(&world, attempt_id).await,
        IndexAttemptStatus::Failed
    );
}

#[tokio::test]
async fn trust_completion_policy_forgives_nonzero_exit() {
    let world = TestWorld::new();
    let (payload, attempt_id) = seeded_payload(&world).await;
    let fence = IndexingFence::new(
        world.ctx.kv.clone(),
        payload.cc_pair_id,
        payload.search_settings_id,
    );
    fence.set_generator_complete(200).await.expect("complete");
    world.process.finish(ProcessExit::Code(1));

    let outcome = watchdog(ExitCodePolicy::TrustCompletion)
        .run(&world.ctx, &world.services, &payload, "task-1")
        .await
        .expect("run");
    assert_eq!(outcome.status, WatchdogTerminalStatus::Succeeded);
    // nobody marked the attempt failed
    assert_eq!(
        attempt_status(&world, attempt_id).await,
        IndexAttemptStatus::InProgress
    );
}
