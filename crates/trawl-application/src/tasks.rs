//! Task names and payloads shared by the beats and the queue workers.

use serde::{Deserialize, Serialize};
use trawl_domain::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId};

/// Watchdog task supervising one indexing attempt.
pub const TASK_INDEXING_WATCHDOG: &str = "indexing_watchdog";

/// Per-document metadata sync task.
pub const TASK_DOC_SYNC: &str = "doc_sync";

/// Checkpoint blob cleanup for one attempt.
pub const TASK_CLEANUP_CHECKPOINT: &str = "cleanup_checkpoint";

/// Payload of [`TASK_INDEXING_WATCHDOG`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingTaskPayload {
    /// The pair being indexed
    pub cc_pair_id: CcPairId,
    /// The index generation being written
    pub search_settings_id: SearchSettingsId,
    /// The attempt row
    pub index_attempt_id: IndexAttemptId,
}

/// Payload of [`TASK_DOC_SYNC`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocSyncPayload {
    /// The document whose metadata must be pushed to the index
    pub document_id: String,
    /// Taskset the task belongs to
    pub taskset_key: String,
    /// This task's member entry in the taskset
    pub taskset_member: String,
}

/// Payload of [`TASK_CLEANUP_CHECKPOINT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupCheckpointPayload {
    /// The attempt whose checkpoint blob should be cleared
    pub index_attempt_id: IndexAttemptId,
}
