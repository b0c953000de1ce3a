//! KV key namespaces.
//!
//! Every key below is logical: the broker implementation prepends the
//! tenant prefix transparently. Fence keys are deterministic functions of
//! the work-unit identity so any process can address them.

use crate::value_objects::{CcPairId, DocumentSetId, SearchSettingsId, UserGroupId};

/// Tenant-scoped set of every currently-fenced work unit.
pub const ACTIVE_FENCES: &str = "trawl:active_fences";

/// Prefix shared by every fence key; used by the lookup-table rebuild scan.
pub const FENCE_SCAN_PREFIX: &str = "trawl:";

/// Beat lock for the indexing scheduler.
pub const CHECK_INDEXING_BEAT_LOCK: &str = "trawl:beat:check_indexing";

/// Beat lock for the document sync coordinator.
pub const CHECK_DOC_SYNC_BEAT_LOCK: &str = "trawl:beat:check_doc_sync";

/// Beat lock for checkpoint retention cleanup.
pub const CHECKPOINT_CLEANUP_BEAT_LOCK: &str = "trawl:beat:checkpoint_cleanup";

/// Block signal: skip rebuilding the active-fence lookup table.
pub const BLOCK_BUILD_FENCE_LOOKUP: &str = "trawl:signal:block_build_fence_lookup";

/// Block signal: skip validating indexing fences against the queue.
pub const BLOCK_VALIDATE_INDEXING_FENCES: &str = "trawl:signal:block_validate_indexing_fences";

/// Prefix of every indexing fence key.
pub const INDEXING_FENCE_PREFIX: &str = "trawl:indexing:fence:";

/// Prefix of every document-set fence key.
pub const DOCSET_FENCE_PREFIX: &str = "trawl:docset:fence:";

/// Prefix of every user-group fence key.
pub const USERGROUP_FENCE_PREFIX: &str = "trawl:usergroup:fence:";

/// Fence key of the tenant-global stale-document sync pass.
pub const CCPAIR_SYNC_FENCE: &str = "trawl:ccpair_sync:fence";

/// Taskset of the tenant-global stale-document sync pass.
pub const CCPAIR_SYNC_TASKSET: &str = "trawl:ccpair_sync:taskset";

/// Indexing fence key for one `(cc_pair, search_settings)` work unit.
#[must_use]
pub fn indexing_fence_key(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("{INDEXING_FENCE_PREFIX}{cc_pair}/{search_settings}")
}

/// Parse `(cc_pair, search_settings)` back out of an indexing fence key.
#[must_use]
pub fn parse_indexing_fence_key(key: &str) -> Option<(CcPairId, SearchSettingsId)> {
    let composite = key.strip_prefix(INDEXING_FENCE_PREFIX)?;
    let (cc, ss) = composite.split_once('/')?;
    Some((
        CcPairId::new(cc.parse().ok()?),
        SearchSettingsId::new(ss.parse().ok()?),
    ))
}

/// Taskset key for one indexing work unit.
#[must_use]
pub fn indexing_taskset_key(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("trawl:indexing:taskset:{cc_pair}/{search_settings}")
}

/// Generator-complete key for one indexing work unit.
#[must_use]
pub fn indexing_generator_complete_key(
    cc_pair: CcPairId,
    search_settings: SearchSettingsId,
) -> String {
    format!("trawl:indexing:generator_complete:{cc_pair}/{search_settings}")
}

/// Generator lock for one indexing work unit (single-flight inner guard).
#[must_use]
pub fn indexing_generator_lock(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("trawl:indexing:generator_lock:{cc_pair}/{search_settings}")
}

/// Watchdog-alive key (short TTL heartbeat).
#[must_use]
pub fn indexing_watchdog_key(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("trawl:indexing:watchdog:{cc_pair}/{search_settings}")
}

/// Active-signal key (medium TTL heartbeat).
#[must_use]
pub fn indexing_active_key(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("trawl:indexing:active:{cc_pair}/{search_settings}")
}

/// Progress counter for one indexing work unit.
#[must_use]
pub fn indexing_progress_key(cc_pair: CcPairId, search_settings: SearchSettingsId) -> String {
    format!("trawl:indexing:progress:{cc_pair}/{search_settings}")
}

/// Terminate-signal key addressed to one watchdog task.
#[must_use]
pub fn indexing_terminate_key(
    cc_pair: CcPairId,
    search_settings: SearchSettingsId,
    task_id: &str,
) -> String {
    format!("trawl:indexing:terminate:{cc_pair}/{search_settings}:{task_id}")
}

/// Connector-deletion fence for a ccpair (blocks new indexing).
#[must_use]
pub fn ccpair_deletion_fence_key(cc_pair: CcPairId) -> String {
    format!("trawl:connector_deletion:fence:{cc_pair}")
}

/// Connector-stop fence for a ccpair (operator pause signal).
#[must_use]
pub fn ccpair_stop_fence_key(cc_pair: CcPairId) -> String {
    format!("trawl:connector_stop:fence:{cc_pair}")
}

/// Document-set fence key.
#[must_use]
pub fn docset_fence_key(id: DocumentSetId) -> String {
    format!("{DOCSET_FENCE_PREFIX}{id}")
}

/// Parse the document-set id out of a fence key.
#[must_use]
pub fn parse_docset_fence_key(key: &str) -> Option<DocumentSetId> {
    let raw = key.strip_prefix(DOCSET_FENCE_PREFIX)?;
    Some(DocumentSetId::new(raw.parse().ok()?))
}

/// Document-set taskset key.
#[must_use]
pub fn docset_taskset_key(id: DocumentSetId) -> String {
    format!("trawl:docset:taskset:{id}")
}

/// User-group fence key.
#[must_use]
pub fn usergroup_fence_key(id: UserGroupId) -> String {
    format!("{USERGROUP_FENCE_PREFIX}{id}")
}

/// Parse the user-group id out of a fence key.
#[must_use]
pub fn parse_usergroup_fence_key(key: &str) -> Option<UserGroupId> {
    let raw = key.strip_prefix(USERGROUP_FENCE_PREFIX)?;
    Some(UserGroupId::new(raw.parse().ok()?))
}

/// User-group taskset key.
#[must_use]
pub fn usergroup_taskset_key(id: UserGroupId) -> String {
    format!("trawl:usergroup:taskset:{id}")
}

/// Returns `true` when a scanned key is a fence key of any kind.
#[must_use]
pub fn is_fence_key(key: &str) -> bool {
    key.starts_with(INDEXING_FENCE_PREFIX)
        || key.starts_with(DOCSET_FENCE_PREFIX)
        || key.starts_with(USERGROUP_FENCE_PREFIX)
        || key == CCPAIR_SYNC_FENCE
}
