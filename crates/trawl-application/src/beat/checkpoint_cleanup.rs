//! Checkpoint retention cleanup.

use trawl_domain::constants::{indexing as limits, keys, timeouts};
use trawl_domain::error::Result;
use trawl_domain::ports::{QueueName, TaskQueue, TaskSubmission};
use trawl_domain::utils::time;
use trawl_domain::value_objects::IndexAttemptId;

use crate::context::TenantContext;
use crate::tasks::{self, CleanupCheckpointPayload};

/// Enqueue cleanup tasks for terminal attempts whose checkpoint blobs
/// outlived the retention window. Returns `None` when another instance
/// holds the beat lock.
pub async fn check_for_checkpoint_cleanup(
    ctx: &TenantContext,
    queue: &dyn TaskQueue,
) -> Result<Option<usize>> {
    let Some(lock) = ctx
        .kv
        .acquire_lock(keys::CHECKPOINT_CLEANUP_BEAT_LOCK, timeouts::BEAT_LOCK_TTL)
        .await?
    else {
        return Ok(None);
    };

    let result = async {
        let cutoff = time::epoch_secs() - limits::CHECKPOINT_RETENTION_SECS;
        let old_attempts = ctx
            .repos
            .index_attempts
            .attempts_with_old_checkpoints(cutoff)
            .await?;
        let mut dispatched = 0usize;
        for attempt in old_attempts {
            tracing::info!(attempt = %attempt.id, "Cleaning up checkpoint for index attempt");
            queue
                .dispatch(TaskSubmission {
                    name: tasks::TASK_CLEANUP_CHECKPOINT.to_owned(),
                    queue: QueueName::Housekeeping,
                    tenant: ctx.tenant.clone(),
                    payload: serde_json::to_value(CleanupCheckpointPayload {
                        index_attempt_id: attempt.id,
                    })?,
                })
                .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
    .await;

    if lock.owned().await.unwrap_or(false) {
        lock.release().await?;
    } else {
        tracing::error!(
            tenant = %ctx.tenant,
            "check_for_checkpoint_cleanup - beat lock not owned on completion"
        );
    }

    result.map(Some)
}

/// Clear one attempt's checkpoint blob.
pub async fn cleanup_checkpoint(ctx: &TenantContext, attempt_id: IndexAttemptId) -> Result<()> {
    ctx.repos.index_attempts.clear_checkpoint(attempt_id).await
}
