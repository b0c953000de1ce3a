//! The sync coordinator beat.
//!
//! One pass: generate stale-document tasks (globally deduplicated across
//! pairs), generate document-set and user-group tasks, then finalize every
//! sync fence whose taskset has drained.

use std::collections::HashSet;

use trawl_domain::constants::{keys, sync as sync_consts, timeouts};
use trawl_domain::entities::{SyncStatus, SyncType};
use trawl_domain::error::Result;
use trawl_domain::ports::TaskQueue;

use crate::context::TenantContext;
use crate::coordination::{
    CcPairSyncTaskGenerator, DocumentSetFence, GlobalDocSyncFence, UserGroupFence,
    registry_members,
};

/// Counters from one coordinator pass.
#[derive(Debug, Clone, Default)]
pub struct SyncPassStats {
    /// Stale-document tasks generated
    pub stale_tasks: usize,
    /// Document-set tasks generated
    pub docset_tasks: usize,
    /// User-group tasks generated
    pub usergroup_tasks: usize,
    /// Fences finalized this pass
    pub finalized: usize,
}

/// Run one coordinator pass. Returns `None` when another instance holds
/// the beat lock.
pub async fn check_for_doc_sync(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
) -> Result<Option<SyncPassStats>> {
    let Some(lock) = ctx
        .kv
        .acquire_lock(keys::CHECK_DOC_SYNC_BEAT_LOCK, timeouts::BEAT_LOCK_TTL)
        .await?
    else {
        return Ok(None);
    };

    let mut stats = SyncPassStats::default();
    let result = run_pass(ctx, queue, lock.as_ref(), &mut stats).await;

    if lock.owned().await.unwrap_or(false) {
        lock.release().await?;
    } else {
        tracing::error!(tenant = %ctx.tenant, "check_for_doc_sync - beat lock not owned on completion");
    }

    result.map(|()| Some(stats))
}

async fn run_pass(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
    lock: &dyn trawl_domain::ports::BrokerLock,
    stats: &mut SyncPassStats,
) -> Result<()> {
    // 1/3: KICKOFF
    stats.stale_tasks = try_generate_stale_document_sync_tasks(ctx, queue, lock).await?;

    lock.reacquire().await?;
    for set in ctx.repos.document_sets.list(true).await? {
        lock.reacquire().await?;
        stats.docset_tasks += try_generate_document_set_sync_tasks(ctx, queue, set.id).await?;
    }

    lock.reacquire().await?;
    if let Some(user_groups) = &ctx.repos.user_groups {
        let groups = user_groups.list(true).await?;
        for group in groups {
            lock.reacquire().await?;
            stats.usergroup_tasks +=
                try_generate_user_group_sync_tasks(ctx, queue, group.id).await?;
        }
    }

    // 2/3: VALIDATE is folded into finalize: dead registry entries drop there

    // 3/3: FINALIZE
    lock.reacquire().await?;
    for key in registry_members(ctx.kv_replica.as_ref()).await? {
        if !ctx.kv.exists(&key).await? {
            ctx.kv.srem(keys::ACTIVE_FENCES, &key).await?;
            continue;
        }
        if key == keys::CCPAIR_SYNC_FENCE {
            monitor_global_taskset(ctx).await?;
            stats.finalized += 1;
        } else if let Some(id) = keys::parse_docset_fence_key(&key) {
            monitor_document_set_taskset(ctx, id).await?;
            stats.finalized += 1;
        } else if let Some(id) = keys::parse_usergroup_fence_key(&key) {
            monitor_user_group_taskset(ctx, id).await?;
            stats.finalized += 1;
        }
    }
    Ok(())
}

/// Generate sync tasks for stale documents across all pairs.
///
/// A zero stale count generates nothing and leaves the fence down; there
/// is no per-entity up-to-date flag to converge on the global path.
async fn try_generate_stale_document_sync_tasks(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
    lock: &dyn trawl_domain::ports::BrokerLock,
) -> Result<usize> {
    let global = GlobalDocSyncFence::new(ctx.kv.clone());
    if global.fenced().await? {
        return Ok(0);
    }
    global.delete_taskset().await?;

    let stale_count = ctx.repos.documents.count_needs_sync().await?;
    if stale_count == 0 {
        return Ok(0);
    }
    tracing::info!(
        stale = stale_count,
        "Stale documents found, generating sync tasks by cc pair"
    );

    let mut skip_docs: HashSet<String> = HashSet::new();
    let mut total_generated = 0usize;
    let mut tasks_remaining = sync_consts::DOC_SYNC_MAX_TASKS;

    for pair in ctx.repos.cc_pairs.list().await? {
        if tasks_remaining == 0 {
            break;
        }
        lock.reacquire().await?;
        let mut generator = CcPairSyncTaskGenerator::new(ctx.kv.clone(), pair.id);
        generator.set_skip_docs(skip_docs);
        let (generated, candidates) = generator
            .generate_tasks(tasks_remaining, queue, ctx.repos.documents.as_ref(), &ctx.tenant)
            .await?;
        skip_docs = generator.into_skip_docs();
        if candidates > 0 {
            tracing::info!(
                cc_pair = %pair.id,
                generated,
                candidates,
                "Generated stale-document sync tasks for pair"
            );
        }
        total_generated += generated;
        tasks_remaining = tasks_remaining.saturating_sub(generated);
    }

    if tasks_remaining == 0 {
        tracing::info!(
            total = total_generated,
            "Stale-document generation hit the task budget"
        );
    }
    global.set_fence(total_generated as i64).await?;
    Ok(total_generated)
}

async fn try_generate_document_set_sync_tasks(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
    id: trawl_domain::value_objects::DocumentSetId,
) -> Result<usize> {
    let fence = DocumentSetFence::new(ctx.kv.clone(), id);
    // tasks still pending from an earlier pass
    if fence.fenced().await? {
        return Ok(0);
    }
    let Some(set) = ctx.repos.document_sets.get(id).await? else {
        return Ok(0);
    };
    if set.is_up_to_date {
        // stray in-progress records would wedge observability
        ctx.repos
            .sync_records
            .cleanup(id.raw(), SyncType::DocumentSet)
            .await?;
        return Ok(0);
    }

    fence.delete_taskset().await?;
    let document_ids = ctx.repos.document_sets.document_ids(id).await?;
    let generated = fence.generate_tasks(queue, &document_ids, &ctx.tenant).await?;

    tracing::info!(document_set = %id, generated, "Generated document-set sync tasks");

    // record before fencing so the monitor can never update a missing row
    ctx.repos
        .sync_records
        .insert(id.raw(), SyncType::DocumentSet)
        .await?;

    // zero tasks still fence: empty sets must converge to up-to-date
    fence.set_fence(generated as i64).await?;
    Ok(generated)
}

async fn try_generate_user_group_sync_tasks(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
    id: trawl_domain::value_objects::UserGroupId,
) -> Result<usize> {
    let Some(user_groups) = &ctx.repos.user_groups else {
        return Ok(0);
    };
    let fence = UserGroupFence::new(ctx.kv.clone(), id);
    if fence.fenced().await? {
        return Ok(0);
    }
    let Some(group) = user_groups.get(id).await? else {
        return Ok(0);
    };
    if group.is_up_to_date {
        ctx.repos
            .sync_records
            .cleanup(id.raw(), SyncType::UserGroup)
            .await?;
        return Ok(0);
    }

    fence.delete_taskset().await?;
    let document_ids = user_groups.document_ids(id).await?;
    let generated = fence.generate_tasks(queue, &document_ids, &ctx.tenant).await?;

    tracing::info!(user_group = %id, generated, "Generated user-group sync tasks");

    ctx.repos
        .sync_records
        .insert(id.raw(), SyncType::UserGroup)
        .await?;
    fence.set_fence(generated as i64).await?;
    Ok(generated)
}

async fn monitor_global_taskset(ctx: &TenantContext) -> Result<()> {
    let global = GlobalDocSyncFence::new(ctx.kv.clone());
    let Some(initial) = global.payload().await? else {
        return Ok(());
    };
    let remaining = global.get_remaining().await?;
    tracing::info!(remaining, initial, "Stale document sync progress");
    if remaining == 0 {
        global.reset().await?;
        tracing::info!(count = initial, "Successfully synced stale documents");
    }
    Ok(())
}

async fn monitor_document_set_taskset(
    ctx: &TenantContext,
    id: trawl_domain::value_objects::DocumentSetId,
) -> Result<()> {
    let fence = DocumentSetFence::new(ctx.kv.clone(), id);
    if !fence.fenced().await? {
        return Ok(());
    }
    let Some(initial) = fence.payload().await? else {
        return Ok(());
    };
    let remaining = fence.get_remaining().await?;
    tracing::info!(
        document_set = %id,
        remaining,
        initial,
        "Document set sync progress"
    );
    if remaining > 0 {
        ctx.repos
            .sync_records
            .update_status(
                id.raw(),
                SyncType::DocumentSet,
                SyncStatus::InProgress,
                remaining as i64,
            )
            .await?;
        return Ok(());
    }

    match ctx.repos.document_sets.get(id).await? {
        Some(_) if !ctx.repos.document_sets.has_ccpair_associations(id).await? => {
            // dangling: no connectors left, delete the set entirely
            ctx.repos.document_sets.delete(id).await?;
            tracing::info!(document_set = %id, "Deleted dangling document set");
            update_record_success(ctx, id.raw(), SyncType::DocumentSet, initial).await;
        }
        Some(_) => {
            ctx.repos.document_sets.mark_synced(id).await?;
            tracing::info!(document_set = %id, "Successfully synced document set");
            update_record_success(ctx, id.raw(), SyncType::DocumentSet, initial).await;
        }
        None => {}
    }
    fence.reset().await
}

async fn monitor_user_group_taskset(
    ctx: &TenantContext,
    id: trawl_domain::value_objects::UserGroupId,
) -> Result<()> {
    let Some(user_groups) = &ctx.repos.user_groups else {
        return Ok(());
    };
    let fence = UserGroupFence::new(ctx.kv.clone(), id);
    if !fence.fenced().await? {
        return Ok(());
    }
    let Some(initial) = fence.payload().await? else {
        return Ok(());
    };
    let remaining = fence.get_remaining().await?;
    tracing::info!(user_group = %id, remaining, initial, "User group sync progress");
    if remaining > 0 {
        ctx.repos
            .sync_records
            .update_status(
                id.raw(),
                SyncType::UserGroup,
                SyncStatus::InProgress,
                remaining as i64,
            )
            .await?;
        return Ok(());
    }

    if user_groups.get(id).await?.is_some() {
        user_groups.mark_synced(id).await?;
        tracing::info!(user_group = %id, "Successfully synced user group");
        update_record_success(ctx, id.raw(), SyncType::UserGroup, initial).await;
    }
    fence.reset().await
}

async fn update_record_success(ctx: &TenantContext, entity_id: i64, sync_type: SyncType, count: i64) {
    if let Err(e) = ctx
        .repos
        .sync_records
        .update_status(entity_id, sync_type, SyncStatus::Success, count)
        .await
    {
        tracing::error!(
            entity = entity_id,
            sync_type = %sync_type,
            error = %e,
            "Failed to update sync record, resetting fence regardless"
        );
    }
}
