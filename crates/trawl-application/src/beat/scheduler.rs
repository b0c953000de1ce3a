//! The indexing scheduler beat.
//!
//! # Passes
//! 0. Lookup-table maintenance: reconcile the active-fence registry from a
//!    keyspace scan, behind its own block-signal TTL.
//! 1. Kickoff: index-swap check, then ccpair × active-settings
//!    enumeration deciding what needs an attempt and opening fences.
//! 2. Validate: fail unfenced `InProgress` attempts; clear fences whose
//!    queue tasks vanished.
//! 3. Finalize: run the per-unit monitor over every registry member.

use trawl_domain::constants::{keys, timeouts};
use trawl_domain::entities::{
    CcPairStatus, ConnectorCredentialPair, DocumentSource, IndexAttempt, IndexAttemptStatus,
    IndexingTrigger, NewIndexAttempt, SearchSettings, SearchSettingsStatus,
};
use trawl_domain::error::Result;
use trawl_domain::ports::{BrokerLock, QueueName, SetOptions, TaskSubmission};
use trawl_domain::utils::time;
use trawl_domain::value_objects::IndexAttemptId;

use crate::context::TenantContext;
use crate::coordination::{IndexingFence, IndexingFencePayload, reconcile_registry, registry_members};
use crate::indexing::IndexingServices;
use crate::tasks::{self, IndexingTaskPayload};

/// Fences whose payload never became ready within this window are
/// presumed orphaned during validation.
const FENCE_SETUP_GRACE_SECS: i64 = 300;

/// Counters from one beat pass.
#[derive(Debug, Clone, Default)]
pub struct BeatStats {
    /// Indexing tasks created
    pub tasks_created: usize,
    /// Unfenced attempts failed during validation
    pub unfenced_failed: usize,
    /// Fences cleared during validation
    pub fences_cleared: usize,
}

/// Run one scheduler pass. Returns `None` when another instance holds the
/// beat lock.
pub async fn check_for_indexing(
    ctx: &TenantContext,
    services: &IndexingServices,
) -> Result<Option<BeatStats>> {
    let Some(lock) = ctx
        .kv
        .acquire_lock(keys::CHECK_INDEXING_BEAT_LOCK, timeouts::BEAT_LOCK_TTL)
        .await?
    else {
        return Ok(None);
    };

    let mut stats = BeatStats::default();
    let result = run_pass(ctx, services, lock.as_ref(), &mut stats).await;

    if lock.owned().await.unwrap_or(false) {
        lock.release().await?;
    } else {
        tracing::error!(
            tenant = %ctx.tenant,
            "check_for_indexing - beat lock not owned on completion"
        );
    }

    result.map(|()| Some(stats))
}

async fn run_pass(
    ctx: &TenantContext,
    services: &IndexingServices,
    lock: &dyn BrokerLock,
    stats: &mut BeatStats,
) -> Result<()> {
    // 0/3: registry lookup-table maintenance
    if !ctx.kv.exists(keys::BLOCK_BUILD_FENCE_LOOKUP).await? {
        let (added, removed) =
            reconcile_registry(ctx.kv.as_ref(), ctx.kv_replica.as_ref()).await?;
        if added > 0 || removed > 0 {
            tracing::info!(added, removed, "Active-fence registry reconciled");
        }
        ctx.kv
            .set(
                keys::BLOCK_BUILD_FENCE_LOOKUP,
                "1",
                SetOptions::with_ttl(timeouts::BLOCK_BUILD_FENCE_LOOKUP_TTL),
            )
            .await?;
    }

    // 1/3: KICKOFF
    check_index_swap(ctx, services).await?;

    lock.reacquire().await?;
    let settings_list = ctx.repos.search_settings.list_active().await?;
    let pairs = ctx.repos.cc_pairs.list().await?;
    let secondary_building = settings_list.len() > 1;

    for pair_entry in &pairs {
        lock.reacquire().await?;
        for settings in &settings_list {
            let fence = IndexingFence::new(ctx.kv.clone(), pair_entry.id, settings.id);
            if fence.fenced().await? {
                continue;
            }

            // fresh read: the trigger may have changed since enumeration
            let Some(pair) = ctx.repos.cc_pairs.get(pair_entry.id).await? else {
                continue;
            };
            let last_attempt = ctx
                .repos
                .index_attempts
                .last_attempt(pair.id, settings.id)
                .await?;
            let primary = settings.status == SearchSettingsStatus::Present;

            if !should_index(
                &pair,
                last_attempt.as_ref(),
                settings,
                primary,
                secondary_building,
                time::epoch_secs(),
            ) {
                continue;
            }

            let mut reindex = false;
            if primary && let Some(trigger) = pair.indexing_trigger {
                reindex = trigger == IndexingTrigger::Reindex;
                tracing::info!(
                    cc_pair = %pair.id,
                    search_settings = %settings.id,
                    trigger = %trigger,
                    "Connector indexing manual trigger detected"
                );
                ctx.repos.cc_pairs.set_indexing_trigger(pair.id, None).await?;
            }

            if let Some(attempt_id) =
                try_creating_indexing_task(ctx, services, &pair, settings, reindex).await?
            {
                tracing::info!(
                    index_attempt = %attempt_id,
                    cc_pair = %pair.id,
                    search_settings = %settings.id,
                    "Connector indexing queued"
                );
                stats.tasks_created += 1;
            }
        }
    }

    // 2/3: VALIDATE
    lock.reacquire().await?;
    for attempt in ctx.repos.index_attempts.in_progress_attempts().await? {
        let fence = IndexingFence::new(ctx.kv.clone(), attempt.cc_pair_id, attempt.search_settings_id);
        if fence.fenced().await? {
            continue;
        }
        let reason = format!(
            "Unfenced index attempt found in DB: index_attempt={} cc_pair={} search_settings={}",
            attempt.id, attempt.cc_pair_id, attempt.search_settings_id
        );
        tracing::error!("{reason}");
        ctx.repos
            .index_attempts
            .mark_failed(attempt.id, &reason, None)
            .await?;
        stats.unfenced_failed += 1;
    }

    lock.reacquire().await?;
    if !ctx.kv.exists(keys::BLOCK_VALIDATE_INDEXING_FENCES).await? {
        stats.fences_cleared = validate_indexing_fences(ctx, services).await?;
        ctx.kv
            .set(
                keys::BLOCK_VALIDATE_INDEXING_FENCES,
                "1",
                SetOptions::with_ttl(timeouts::BLOCK_VALIDATE_INDEXING_FENCES_TTL),
            )
            .await?;
    }

    // 3/3: FINALIZE
    lock.reacquire().await?;
    for key in registry_members(ctx.kv_replica.as_ref()).await? {
        if !ctx.kv.exists(&key).await? {
            ctx.kv.srem(keys::ACTIVE_FENCES, &key).await?;
            continue;
        }
        if let Some((cc_pair, search_settings)) = keys::parse_indexing_fence_key(&key) {
            let fence = IndexingFence::new(ctx.kv.clone(), cc_pair, search_settings);
            monitor_indexing_fence(ctx, services, &fence).await?;
        }
    }
    Ok(())
}

/// Complete an index migration when the FUTURE generation has a successful
/// attempt for every pair, then warm the embedding model.
async fn check_index_swap(ctx: &TenantContext, services: &IndexingServices) -> Result<bool> {
    let Some(secondary) = ctx.repos.search_settings.get_secondary().await? else {
        return Ok(false);
    };
    let missing = ctx
        .repos
        .search_settings
        .count_pairs_missing_success(secondary.id)
        .await?;
    if missing > 0 {
        return Ok(false);
    }

    if let Some(current) = ctx.repos.search_settings.get_current().await? {
        ctx.repos
            .search_settings
            .set_status(current.id, SearchSettingsStatus::Past)
            .await?;
    }
    ctx.repos
        .search_settings
        .set_status(secondary.id, SearchSettingsStatus::Present)
        .await?;
    tracing::info!(search_settings = %secondary.id, "Index swap completed");

    // so the first batches against the new generation aren't surprisingly slow
    if let Err(e) = services.embedding.warm_up().await {
        tracing::warn!(error = %e, "Embedding warm-up failed after index swap");
    }
    Ok(true)
}

/// Decide whether a pair × settings unit needs an indexing attempt now.
#[must_use]
pub fn should_index(
    pair: &ConnectorCredentialPair,
    last_attempt: Option<&IndexAttempt>,
    settings: &SearchSettings,
    primary: bool,
    secondary_building: bool,
    now: i64,
) -> bool {
    if pair.status == CcPairStatus::Deleting {
        return false;
    }
    // pushed documents never get pulled
    if pair.source == DocumentSource::IngestionApi {
        return false;
    }

    // a FUTURE generation backfills once per pair, retrying failures;
    // paused pairs still backfill so the migration can complete
    if settings.status == SearchSettingsStatus::Future {
        return match last_attempt {
            None => true,
            Some(attempt) => matches!(
                attempt.status,
                IndexAttemptStatus::Failed | IndexAttemptStatus::Canceled
            ),
        };
    }

    if primary && pair.indexing_trigger.is_some() {
        return true;
    }
    if !pair.schedulable() {
        return false;
    }
    if let Some(attempt) = last_attempt
        && !attempt.status.is_terminal()
    {
        return false;
    }
    // refresh-based work yields while a migration backfill is running
    if secondary_building {
        return false;
    }
    let Some(refresh) = pair.refresh_freq_secs else {
        return last_attempt.is_none();
    };
    match pair.last_successful_index_time {
        None => true,
        Some(last_success) => now - last_success >= refresh,
    }
}

/// Create the attempt row, open the fence, dispatch the watchdog task and
/// populate the fence payload with its id.
///
/// All three are observable together by the time the beat lock is
/// released; a dispatch failure rolls the fence back and fails the row.
pub async fn try_creating_indexing_task(
    ctx: &TenantContext,
    services: &IndexingServices,
    pair: &ConnectorCredentialPair,
    settings: &SearchSettings,
    reindex: bool,
) -> Result<Option<IndexAttemptId>> {
    // deletion wins over new indexing
    if ctx
        .kv
        .exists(&keys::ccpair_deletion_fence_key(pair.id))
        .await?
    {
        return Ok(None);
    }

    let attempt_id = ctx
        .repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: pair.id,
            search_settings_id: settings.id,
            from_beginning: reindex,
        })
        .await?;

    let fence = IndexingFence::new(ctx.kv.clone(), pair.id, settings.id);
    let mut payload = IndexingFencePayload::submitted_now(attempt_id);
    fence.set_fence(Some(&payload)).await?;

    let dispatch = services
        .queue
        .dispatch(TaskSubmission {
            name: tasks::TASK_INDEXING_WATCHDOG.to_owned(),
            queue: QueueName::Indexing,
            tenant: ctx.tenant.clone(),
            payload: serde_json::to_value(IndexingTaskPayload {
                cc_pair_id: pair.id,
                search_settings_id: settings.id,
                index_attempt_id: attempt_id,
            })?,
        })
        .await;

    match dispatch {
        Ok(task_id) => {
            payload.task_id = Some(task_id);
            fence.set_fence(Some(&payload)).await?;
            Ok(Some(attempt_id))
        }
        Err(e) => {
            tracing::error!(
                cc_pair = %pair.id,
                search_settings = %settings.id,
                error = %e,
                "Failed to dispatch indexing watchdog task"
            );
            fence.set_fence(None).await?;
            ctx.repos
                .index_attempts
                .mark_failed(attempt_id, "failed to dispatch watchdog task", None)
                .await?;
            Ok(None)
        }
    }
}

/// Clear indexing fences that no longer have a live task behind them.
async fn validate_indexing_fences(
    ctx: &TenantContext,
    services: &IndexingServices,
) -> Result<usize> {
    let mut cleared = 0usize;
    for key in registry_members(ctx.kv_replica.as_ref()).await? {
        let Some((cc_pair, search_settings)) = keys::parse_indexing_fence_key(&key) else {
            continue;
        };
        let fence = IndexingFence::new(ctx.kv.clone(), cc_pair, search_settings);
        let Some(payload) = fence.payload().await? else {
            continue;
        };

        let age = time::epoch_secs() - payload.submitted;
        let live = match &payload.task_id {
            Some(task_id) => services.queue.state(task_id).await.is_live(),
            None => false,
        };
        // a fence still setting up is given a grace period; after that, a
        // fence without a live or finished task is an orphan
        let finished = match &payload.task_id {
            Some(task_id) => services.queue.state(task_id).await.is_ready(),
            None => false,
        };
        if !live && !finished && age > FENCE_SETUP_GRACE_SECS {
            tracing::warn!(
                fence = %key,
                age,
                "Indexing fence has no live task behind it, clearing"
            );
            fence.reset().await?;
            cleared += 1;
        }
    }
    Ok(cleared)
}

/// Finalize one indexing fence.
///
/// The generator-complete key is the inner signal; the queue's ready
/// state is the outer. A crashed worker is declared only by the
/// inner/outer/inner double-check.
pub(crate) async fn monitor_indexing_fence(
    ctx: &TenantContext,
    services: &IndexingServices,
    fence: &IndexingFence,
) -> Result<()> {
    if !fence.fenced().await? {
        return Ok(());
    }
    let Some(payload) = fence.payload().await? else {
        return Ok(());
    };
    if !payload.is_ready() {
        // the task is still setting up
        return Ok(());
    }
    let Some(task_id) = payload.task_id.as_deref() else {
        return Ok(());
    };
    let Some(attempt_id) = payload.index_attempt_id else {
        return Ok(());
    };

    let progress = fence.get_progress().await?;

    let completion = fence.get_completion().await?;
    let Some(status) = completion else {
        // inner signal not set: suspicious only when the outer state says
        // the task already finished
        if services.queue.state(task_id).await.is_ready() {
            // double check: the inner signal cannot change once the outer
            // state is ready
            if fence.get_completion().await?.is_none() {
                let outcome = services.queue.outcome(task_id).await;
                let reason = format!(
                    "Connector indexing aborted or exceptioned: attempt={} task={} result={:?}",
                    attempt_id, task_id, outcome
                );
                tracing::warn!("{reason}");
                if let Some(attempt) = ctx.repos.index_attempts.get(attempt_id).await?
                    && !attempt.status.is_terminal()
                {
                    ctx.repos
                        .index_attempts
                        .mark_failed(attempt_id, &reason, None)
                        .await?;
                }
                fence.reset().await?;
            }
        }
        return Ok(());
    };

    if fence.watchdog_signaled().await? {
        // the generator is done but the watchdog hasn't exited; let it
        // finish its own reporting before tearing the fence down
        tracing::info!(
            attempt = %attempt_id,
            progress = ?progress,
            "Delaying finalization until watchdog has exited"
        );
        return Ok(());
    }

    tracing::info!(
        attempt = %attempt_id,
        status,
        progress = ?progress,
        "Connector indexing finished"
    );
    fence.reset().await
}
