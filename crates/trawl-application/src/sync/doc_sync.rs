//! Per-document metadata sync worker.

use std::time::Duration;

use trawl_domain::constants::sync as sync_consts;
use trawl_domain::error::Result;
use trawl_domain::ports::{DocumentIndexFields, SearchIndexProvider};

use crate::context::TenantContext;
use crate::tasks::DocSyncPayload;

/// Push one document's metadata (ACL, document sets, boost, hidden) to
/// every active index generation, then mark it synced.
///
/// Error policy: a 400 from the index is non-retryable; other errors back
/// off `2^(retries+4)` seconds capped by the task budget. The taskset
/// member is removed on every terminal outcome so the owning fence can
/// converge; a permanently failing document stays `needs_sync` and is
/// retried by a later pass.
pub async fn sync_document(
    ctx: &TenantContext,
    search_index: &dyn SearchIndexProvider,
    payload: &DocSyncPayload,
) -> Result<bool> {
    let result = sync_document_inner(ctx, search_index, payload).await;
    if let Err(e) = ctx
        .kv
        .srem(&payload.taskset_key, &payload.taskset_member)
        .await
    {
        tracing::warn!(
            taskset = %payload.taskset_key,
            error = %e,
            "Failed to remove taskset member"
        );
    }
    result
}

async fn sync_document_inner(
    ctx: &TenantContext,
    search_index: &dyn SearchIndexProvider,
    payload: &DocSyncPayload,
) -> Result<bool> {
    let document_id = &payload.document_id;
    let Some(doc) = ctx.repos.documents.get(document_id).await? else {
        tracing::info!(doc = %document_id, "Document vanished before sync, skipping");
        return Ok(false);
    };

    let access = ctx.repos.documents.access_for_document(document_id).await?;
    let document_sets = ctx
        .repos
        .documents
        .document_sets_for_document(document_id)
        .await?;

    let fields = DocumentIndexFields {
        access: Some(access),
        document_sets: Some(document_sets),
        boost: Some(doc.boost),
        hidden: Some(doc.hidden),
    };

    let settings_list = ctx.repos.search_settings.list_active().await?;
    let mut chunks_affected = 0u64;
    for settings in &settings_list {
        chunks_affected += update_single_with_backoff(
            search_index,
            &settings.index_name,
            ctx,
            document_id,
            doc.chunk_count,
            &fields,
        )
        .await?;
    }

    // relational store last: worst case we crash before this and the sync
    // harmlessly repeats
    ctx.repos.documents.mark_synced(document_id).await?;

    tracing::info!(
        doc = %document_id,
        action = "sync",
        chunks = chunks_affected,
        "Document metadata synced"
    );
    Ok(true)
}

async fn update_single_with_backoff(
    search_index: &dyn SearchIndexProvider,
    index_name: &str,
    ctx: &TenantContext,
    document_id: &str,
    chunk_count: Option<i64>,
    fields: &DocumentIndexFields,
) -> Result<u64> {
    let mut retries = 0u32;
    loop {
        match search_index
            .update_single(index_name, document_id, &ctx.tenant, chunk_count, fields)
            .await
        {
            Ok(affected) => return Ok(affected),
            Err(e) if e.index_status() == Some(400) => {
                tracing::error!(
                    doc = %document_id,
                    status = 400,
                    "Non-retryable index error during metadata sync"
                );
                return Err(e);
            }
            Err(e) => {
                retries += 1;
                if retries > sync_consts::DOC_SYNC_MAX_RETRIES {
                    return Err(e);
                }
                let countdown = Duration::from_secs(
                    2u64.saturating_pow(retries + sync_consts::DOC_SYNC_BACKOFF_EXP_OFFSET),
                )
                .min(Duration::from_secs(sync_consts::DOC_SYNC_SOFT_LIMIT_SECS));
                tracing::warn!(
                    doc = %document_id,
                    retries,
                    countdown_secs = countdown.as_secs(),
                    error = %e,
                    "Index error during metadata sync, backing off"
                );
                tokio::time::sleep(countdown).await;
            }
        }
    }
}
