//! Scheduler beat: kickoff decisions, single-flight, validation, and the
//! crash double-check.

use trawl_application::beat::{check_for_indexing, should_index, try_creating_indexing_task};
use trawl_application::coordination::{IndexingFence, IndexingFencePayload};
use trawl_application::tasks::TASK_INDEXING_WATCHDOG;
use trawl_domain::entities::{
    CcPairStatus, IndexAttemptStatus, IndexingTrigger, NewIndexAttempt, SearchSettingsStatus,
};
use trawl_domain::ports::TaskState;
use trawl_domain::utils::time;
use trawl_domain::value_objects::{CcPairId, SearchSettingsId};

use crate::utils::shared_context::{default_pair, default_settings};
use crate::utils::TestWorld;

mod should_index_decisions {
    use super::*;
    use trawl_domain::entities::IndexAttempt;

    fn attempt(status: IndexAttemptStatus) -> IndexAttempt {
        IndexAttempt {
            id: trawl_domain::value_objects::IndexAttemptId::new(9),
            cc_pair_id: CcPairId::new(1),
            search_settings_id: SearchSettingsId::new(1),
            status,
            from_beginning: false,
            poll_range_start: None,
            poll_range_end: None,
            checkpoint_blob: None,
            error_msg: None,
            full_exception_trace: None,
            total_docs_indexed: 0,
            new_docs_indexed: 0,
            created_at: 0,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn first_run_indexes_immediately() {
        let pair = default_pair(1);
        let settings = default_settings(1);
        assert!(should_index(&pair, None, &settings, true, false, 10_000));
    }

    #[test]
    fn paused_and_deleting_pairs_never_index() {
        let settings = default_settings(1);
        let mut pair = default_pair(1);
        pair.status = CcPairStatus::Paused;
        assert!(!should_index(&pair, None, &settings, true, false, 10_000));
        pair.status = CcPairStatus::Deleting;
        assert!(!should_index(&pair, None, &settings, true, false, 10_000));
    }

    #[test]
    fn refresh_cadence_gates_rescheduling() {
        let settings = default_settings(1);
        let mut pair = default_pair(1);
        pair.refresh_freq_secs = Some(3600);
        pair.last_successful_index_time = Some(10_000);
        let last = attempt(IndexAttemptStatus::Success);
        assert!(!should_index(
            &pair,
            Some(&last),
            &settings,
            true,
            false,
            10_000 + 100
        ));
        assert!(should_index(
            &pair,
            Some(&last),
            &settings,
            true,
            false,
            10_000 + 3600
        ));
    }

    #[test]
    fn manual_trigger_overrides_everything_on_primary() {
        let settings = default_settings(1);
        let mut pair = default_pair(1);
        pair.indexing_trigger = Some(IndexingTrigger::Update);
        pair.last_successful_index_time = Some(10_000);
        let last = attempt(IndexAttemptStatus::Success);
        assert!(should_index(
            &pair,
            Some(&last),
            &settings,
            true,
            false,
            10_001
        ));
    }

    #[test]
    fn repeated_error_state_pauses_scheduling() {
        let settings = default_settings(1);
        let mut pair = default_pair(1);
        pair.in_repeated_error_state = true;
        assert!(!should_index(&pair, None, &settings, true, false, 10_000));
    }

    #[test]
    fn future_settings_backfill_once_and_retry_failures() {
        let mut settings = default_settings(2);
        settings.status = SearchSettingsStatus::Future;
        let pair = default_pair(1);
        assert!(should_index(&pair, None, &settings, false, true, 10_000));
        assert!(!should_index(
            &pair,
            Some(&attempt(IndexAttemptStatus::Success)),
            &settings,
            false,
            true,
            10_000
        ));
        assert!(should_index(
            &pair,
            Some(&attempt(IndexAttemptStatus::Failed)),
            &settings,
            false,
            true,
            10_000
        ));
    }

    #[test]
    fn in_flight_attempts_block_new_ones() {
        let settings = default_settings(1);
        let pair = default_pair(1);
        assert!(!should_index(
            &pair,
            Some(&attempt(IndexAttemptStatus::InProgress)),
            &settings,
            true,
            false,
            10_000
        ));
    }
}

#[tokio::test]
async fn try_creating_opens_fence_row_and_task_together() {
    let world = TestWorld::new();
    let (pair_id, settings_id) = world.seed_default_pair();
    let pair = world
        .ctx
        .repos
        .cc_pairs
        .get(pair_id)
        .await
        .expect("get")
        .expect("pair");
    let settings = world
        .ctx
        .repos
        .search_settings
        .get(settings_id)
        .await
        .expect("get")
        .expect("settings");

    let attempt_id = try_creating_indexing_task(&world.ctx, &world.services, &pair, &settings, false)
        .await
        .expect("create")
        .expect("attempt id");

    // attempt row exists
    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::NotStarted);

    // fence is up, registered, and its payload carries attempt + task ids
    let fence = IndexingFence::new(world.ctx.kv.clone(), pair_id, settings_id);
    assert!(fence.fenced().await.expect("fenced"));
    let payload = fence.payload().await.expect("payload").expect("some");
    assert_eq!(payload.index_attempt_id, Some(attempt_id));
    assert!(payload.is_ready());

    // the watchdog task is in the queue with the same payload
    let submissions = world.queue.submissions_named(TASK_INDEXING_WATCHDOG);
    assert_eq!(submissions.len(), 1);
    assert_eq!(Some(submissions[0].0.clone()), payload.task_id);
}

#[tokio::test]
async fn beat_is_single_flight_per_unit() {
    let world = TestWorld::new();
    world.seed_default_pair();

    let first = check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");
    assert_eq!(first.tasks_created, 1);

    // the fence is up and the task is still pending: the second pass must
    // not create another attempt
    let second = check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");
    assert_eq!(second.tasks_created, 0);

    let in_flight = world
        .ctx
        .repos
        .index_attempts
        .in_progress_attempts()
        .await
        .expect("attempts");
    assert_eq!(in_flight.len(), 1);
}

#[tokio::test]
async fn unfenced_in_progress_attempts_are_failed() {
    let world = TestWorld::new();
    let (pair_id, settings_id) = world.seed_default_pair();

    // an attempt row with no fence behind it
    let orphan = world
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
        .transition_to_in_progress(orphan)
        .await
        .expect("transition");

    // make the pair unschedulable so kickoff doesn't fence the same unit
    world
        .ctx
        .repos
        .cc_pairs
        .set_status(pair_id, CcPairStatus::Paused)
        .await
        .expect("pause");

    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(orphan)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Failed);
    assert!(
        attempt
            .error_msg
            .unwrap_or_default()
            .contains("Unfenced index attempt found in DB")
    );
}

#[tokio::test]
async fn crashed_worker_is_detected_by_the_double_check() {
    let world = TestWorld::new();
    let (pair_id, settings_id) = world.seed_default_pair();

    // a fenced unit whose task went terminal without ever writing the
    // generator-complete key: the watchdog (outer) is ready, the inner
    // signal is missing
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

    let fence = IndexingFence::new(world.ctx.kv.clone(), pair_id, settings_id);
    let mut payload = IndexingFencePayload::submitted_now(attempt_id);
    payload.task_id = Some("crashed-task".to_owned());
    fence.set_fence(Some(&payload)).await.expect("fence");
    world.queue.set_state("crashed-task", TaskState::Ready);
    world
        .queue
        .set_outcome("crashed-task", false, Some("worker killed"));

    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");

    let attempt = world
        .ctx
        .repos
        .index_attempts
        .get(attempt_id)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(attempt.status, IndexAttemptStatus::Failed);
    assert!(
        attempt
            .error_msg
            .unwrap_or_default()
            .contains("aborted or exceptioned")
    );
    assert!(!fence.fenced().await.expect("fenced"));
}

#[tokio::test]
async fn finished_units_wait_for_the_watchdog_then_finalize() {
    let world = TestWorld::new();
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

    let fence = IndexingFence::new(world.ctx.kv.clone(), pair_id, settings_id);
    let mut payload = IndexingFencePayload::submitted_now(attempt_id);
    payload.task_id = Some("done-task".to_owned());
    fence.set_fence(Some(&payload)).await.expect("fence");
    world.queue.set_state("done-task", TaskState::Ready);
    fence.set_generator_complete(200).await.expect("complete");
    fence.set_watchdog(true).await.expect("watchdog");

    // while the watchdog is alive the fence stays for its reporting
    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");
    assert!(fence.fenced().await.expect("fenced"));

    // once the watchdog exits the unit finalizes
    fence.set_watchdog(false).await.expect("watchdog");
    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");
    assert!(!fence.fenced().await.expect("fenced"));
}

#[tokio::test]
async fn reindex_trigger_sets_from_beginning_and_clears() {
    let world = TestWorld::new();
    let (pair_id, _) = world.seed_default_pair();
    world
        .ctx
        .repos
        .cc_pairs
        .set_indexing_trigger(pair_id, Some(IndexingTrigger::Reindex))
        .await
        .expect("trigger");

    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");

    let attempts = world
        .ctx
        .repos
        .index_attempts
        .in_progress_attempts()
        .await
        .expect("attempts");
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].from_beginning);

    let pair = world
        .ctx
        .repos
        .cc_pairs
        .get(pair_id)
        .await
        .expect("get")
        .expect("pair");
    assert!(pair.indexing_trigger.is_none());
}

#[tokio::test]
async fn fences_created_long_ago_without_tasks_are_reaped() {
    let world = TestWorld::new();
    let (pair_id, settings_id) = world.seed_default_pair();
    world
        .ctx
        .repos
        .cc_pairs
        .set_status(pair_id, CcPairStatus::Paused)
        .await
        .expect("pause");

    // a stale fence whose task the queue has never heard of
    let fence = IndexingFence::new(world.ctx.kv.clone(), pair_id, settings_id);
    let payload = IndexingFencePayload {
        submitted: time::epoch_secs() - 3600,
        started: None,
        index_attempt_id: Some(trawl_domain::value_objects::IndexAttemptId::new(404)),
        task_id: Some("vanished-task".to_owned()),
    };
    fence.set_fence(Some(&payload)).await.expect("fence");

    check_for_indexing(&world.ctx, &world.services)
        .await
        .expect("beat")
        .expect("ran");
    assert!(!fence.fenced().await.expect("fenced"));
}
