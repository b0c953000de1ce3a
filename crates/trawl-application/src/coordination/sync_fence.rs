//! Sync fences: global stale-document pass, document sets, user groups.
//!
//! These fences store the generated task count as their payload; the
//! taskset tracks the outstanding per-document tasks, and a pass is done
//! when the taskset drains to zero.

use std::collections::HashSet;
use std::sync::Arc;

use trawl_domain::constants::{keys, sync as sync_consts};
use trawl_domain::error::Result;
use trawl_domain::ports::{DocumentRepository, KvBroker, QueueName, SetOptions, TaskQueue, TaskSubmission};
use trawl_domain::value_objects::{CcPairId, DocumentSetId, TenantId, UserGroupId};

use crate::tasks::{self, DocSyncPayload};

/// Shared count-payload fence plumbing.
#[derive(Clone)]
struct CountFence {
    kv: Arc<dyn KvBroker>,
    fence_key: String,
    taskset_key: String,
}

impl CountFence {
    async fn fenced(&self) -> Result<bool> {
        self.kv.exists(&self.fence_key).await
    }

    async fn payload(&self) -> Result<Option<i64>> {
        Ok(self
            .kv
            .get(&self.fence_key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok()))
    }

    async fn set_fence(&self, count: i64) -> Result<()> {
        self.kv
            .set(&self.fence_key, &count.to_string(), SetOptions::default())
            .await?;
        self.kv.sadd(keys::ACTIVE_FENCES, &self.fence_key).await?;
        Ok(())
    }

    async fn get_remaining(&self) -> Result<u64> {
        self.kv.scard(&self.taskset_key).await
    }

    async fn delete_taskset(&self) -> Result<()> {
        self.kv.delete(&self.taskset_key).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.kv.srem(keys::ACTIVE_FENCES, &self.fence_key).await?;
        self.kv.delete(&self.taskset_key).await?;
        self.kv.delete(&self.fence_key).await?;
        Ok(())
    }
}

/// Enqueue one per-document sync task and register it in a taskset.
async fn dispatch_doc_sync_task(
    queue: &dyn TaskQueue,
    kv: &dyn KvBroker,
    tenant: &TenantId,
    taskset_key: &str,
    document_id: &str,
) -> Result<()> {
    let member = uuid::Uuid::new_v4().to_string();
    // register before dispatch so the monitor can never observe a running
    // task missing from the taskset
    kv.sadd(taskset_key, &member).await?;
    let payload = DocSyncPayload {
        document_id: document_id.to_owned(),
        taskset_key: taskset_key.to_owned(),
        taskset_member: member,
    };
    queue
        .dispatch(TaskSubmission {
            name: tasks::TASK_DOC_SYNC.to_owned(),
            queue: QueueName::DocSync,
            tenant: tenant.clone(),
            payload: serde_json::to_value(&payload)?,
        })
        .await?;
    Ok(())
}

/// The tenant-global stale-document sync fence.
#[derive(Clone)]
pub struct GlobalDocSyncFence {
    inner: CountFence,
}

impl GlobalDocSyncFence {
    /// Bind the global fence.
    pub fn new(kv: Arc<dyn KvBroker>) -> Self {
        Self {
            inner: CountFence {
                kv,
                fence_key: keys::CCPAIR_SYNC_FENCE.to_owned(),
                taskset_key: keys::CCPAIR_SYNC_TASKSET.to_owned(),
            },
        }
    }

    /// Whether the fence key exists.
    pub async fn fenced(&self) -> Result<bool> {
        self.inner.fenced().await
    }

    /// The generated task count, when fenced.
    pub async fn payload(&self) -> Result<Option<i64>> {
        self.inner.payload().await
    }

    /// Fence with the total generated task count.
    pub async fn set_fence(&self, count: i64) -> Result<()> {
        self.inner.set_fence(count).await
    }

    /// Outstanding task count.
    pub async fn get_remaining(&self) -> Result<u64> {
        self.inner.get_remaining().await
    }

    /// Clear the taskset before a fresh generation pass.
    pub async fn delete_taskset(&self) -> Result<()> {
        self.inner.delete_taskset().await
    }

    /// Tear down fence + taskset + registry entry.
    pub async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }
}

/// Per-ccpair generator feeding the global stale-document taskset.
///
/// Documents spanning multiple pairs are deduplicated through the shared
/// skip set so each is synced once per pass.
pub struct CcPairSyncTaskGenerator {
    kv: Arc<dyn KvBroker>,
    cc_pair: CcPairId,
    skip_docs: HashSet<String>,
}

impl CcPairSyncTaskGenerator {
    /// Bind a generator for one pair.
    pub fn new(kv: Arc<dyn KvBroker>, cc_pair: CcPairId) -> Self {
        Self {
            kv,
            cc_pair,
            skip_docs: HashSet::new(),
        }
    }

    /// Seed the cross-pair dedup set.
    pub fn set_skip_docs(&mut self, skip: HashSet<String>) {
        self.skip_docs = skip;
    }

    /// Consume the dedup set back (now including this pair's docs).
    #[must_use]
    pub fn into_skip_docs(self) -> HashSet<String> {
        self.skip_docs
    }

    /// Enqueue up to `limit` sync tasks for this pair's stale documents.
    ///
    /// Returns `(generated, candidates)`.
    pub async fn generate_tasks(
        &mut self,
        limit: usize,
        queue: &dyn TaskQueue,
        docs: &dyn DocumentRepository,
        tenant: &TenantId,
    ) -> Result<(usize, usize)> {
        let candidates = docs.stale_document_ids(self.cc_pair, limit).await?;
        let total = candidates.len();
        let mut generated = 0usize;
        for document_id in candidates {
            if self.skip_docs.contains(&document_id) {
                continue;
            }
            dispatch_doc_sync_task(
                queue,
                self.kv.as_ref(),
                tenant,
                keys::CCPAIR_SYNC_TASKSET,
                &document_id,
            )
            .await?;
            self.skip_docs.insert(document_id);
            generated += 1;
        }
        Ok((generated, total))
    }
}

/// Fence for one document set's membership sync.
#[derive(Clone)]
pub struct DocumentSetFence {
    inner: CountFence,
    id: DocumentSetId,
}

impl DocumentSetFence {
    /// Bind the fence for one document set.
    pub fn new(kv: Arc<dyn KvBroker>, id: DocumentSetId) -> Self {
        Self {
            inner: CountFence {
                kv,
                fence_key: keys::docset_fence_key(id),
                taskset_key: keys::docset_taskset_key(id),
            },
            id,
        }
    }

    /// The document set this fence covers.
    #[must_use]
    pub fn id(&self) -> DocumentSetId {
        self.id
    }

    /// Whether the fence key exists.
    pub async fn fenced(&self) -> Result<bool> {
        self.inner.fenced().await
    }

    /// The generated task count, when fenced.
    pub async fn payload(&self) -> Result<Option<i64>> {
        self.inner.payload().await
    }

    /// Fence with the generated task count (zero is legitimate: empty sets
    /// still converge to up-to-date).
    pub async fn set_fence(&self, count: i64) -> Result<()> {
        self.inner.set_fence(count).await
    }

    /// Outstanding task count.
    pub async fn get_remaining(&self) -> Result<u64> {
        self.inner.get_remaining().await
    }

    /// Clear the taskset before a fresh generation pass.
    pub async fn delete_taskset(&self) -> Result<()> {
        self.inner.delete_taskset().await
    }

    /// Enqueue sync tasks for every document affected by the set.
    ///
    /// Returns the number generated, capped at
    /// [`sync_consts::DOC_SYNC_MAX_TASKS`].
    pub async fn generate_tasks(
        &self,
        queue: &dyn TaskQueue,
        document_ids: &[String],
        tenant: &TenantId,
    ) -> Result<usize> {
        let mut generated = 0usize;
        for document_id in document_ids
            .iter()
            .take(sync_consts::DOC_SYNC_MAX_TASKS)
        {
            dispatch_doc_sync_task(
                queue,
                self.inner.kv.as_ref(),
                tenant,
                &self.inner.taskset_key,
                document_id,
            )
            .await?;
            generated += 1;
        }
        Ok(generated)
    }

    /// Tear down fence + taskset + registry entry.
    pub async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }
}

/// Fence for one user group's ACL sync.
#[derive(Clone)]
pub struct UserGroupFence {
    inner: CountFence,
    id: UserGroupId,
}

impl UserGroupFence {
    /// Bind the fence for one user group.
    pub fn new(kv: Arc<dyn KvBroker>, id: UserGroupId) -> Self {
        Self {
            inner: CountFence {
                kv,
                fence_key: keys::usergroup_fence_key(id),
                taskset_key: keys::usergroup_taskset_key(id),
            },
            id,
        }
    }

    /// The user group this fence covers.
    #[must_use]
    pub fn id(&self) -> UserGroupId {
        self.id
    }

    /// Whether the fence key exists.
    pub async fn fenced(&self) -> Result<bool> {
        self.inner.fenced().await
    }

    /// The generated task count, when fenced.
    pub async fn payload(&self) -> Result<Option<i64>> {
        self.inner.payload().await
    }

    /// Fence with the generated task count.
    pub async fn set_fence(&self, count: i64) -> Result<()> {
        self.inner.set_fence(count).await
    }

    /// Outstanding task count.
    pub async fn get_remaining(&self) -> Result<u64> {
        self.inner.get_remaining().await
    }

    /// Clear the taskset before a fresh generation pass.
    pub async fn delete_taskset(&self) -> Result<()> {
        self.inner.delete_taskset().await
    }

    /// Enqueue sync tasks for every document affected by the group.
    pub async fn generate_tasks(
        &self,
        queue: &dyn TaskQueue,
        document_ids: &[String],
        tenant: &TenantId,
    ) -> Result<usize> {
        let mut generated = 0usize;
        for document_id in document_ids
            .iter()
            .take(sync_consts::DOC_SYNC_MAX_TASKS)
        {
            dispatch_doc_sync_task(
                queue,
                self.inner.kv.as_ref(),
                tenant,
                &self.inner.taskset_key,
                document_id,
            )
            .await?;
            generated += 1;
        }
        Ok(generated)
    }

    /// Tear down fence + taskset + registry entry.
    pub async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }
}
