//! Repository ports over the relational store.
//!
//! All access to the relational store goes through these typed functions;
//! the core assumes read-committed isolation underneath and never holds a
//! session across suspension points it does not control.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::{
    ConnectorCredentialPair, ConnectorFailure, DocumentAccess, DocumentMetadata, DocumentRow,
    DocumentSet, IndexAttempt, IndexAttemptError, IndexingTrigger, NewIndexAttempt, SearchSettings,
    SearchSettingsStatus, SyncRecord, SyncStatus, SyncType, UpdatableChunkData, UserGroup,
};
use crate::error::Result;
use crate::value_objects::{CcPairId, DocumentSetId, IndexAttemptId, SearchSettingsId, UserGroupId};

/// Connector-credential pair repository.
#[async_trait]
pub trait CcPairRepository: Send + Sync {
    /// Insert a pair; returns its id.
    async fn create(&self, pair: &ConnectorCredentialPair) -> Result<CcPairId>;

    /// Fetch a pair by id.
    async fn get(&self, id: CcPairId) -> Result<Option<ConnectorCredentialPair>>;

    /// All pairs, in id order.
    async fn list(&self) -> Result<Vec<ConnectorCredentialPair>>;

    /// Update the lifecycle status.
    async fn set_status(&self, id: CcPairId, status: crate::entities::CcPairStatus) -> Result<()>;

    /// Set or clear the manual indexing trigger.
    async fn set_indexing_trigger(
        &self,
        id: CcPairId,
        trigger: Option<IndexingTrigger>,
    ) -> Result<()>;

    /// Record a successful run completion time (epoch seconds).
    async fn set_last_successful_index_time(&self, id: CcPairId, epoch_secs: i64) -> Result<()>;

    /// Flag or clear the repeated-error state.
    async fn set_repeated_error_state(&self, id: CcPairId, value: bool) -> Result<()>;
}

/// Search-settings repository.
#[async_trait]
pub trait SearchSettingsRepository: Send + Sync {
    /// Insert a settings row; returns its id.
    async fn create(&self, settings: &SearchSettings) -> Result<SearchSettingsId>;

    /// Fetch by id.
    async fn get(&self, id: SearchSettingsId) -> Result<Option<SearchSettings>>;

    /// Active generations: the `Present` one first, then `Future` if any.
    async fn list_active(&self) -> Result<Vec<SearchSettings>>;

    /// The current `Present` generation.
    async fn get_current(&self) -> Result<Option<SearchSettings>>;

    /// The `Future` generation, when a migration is in progress.
    async fn get_secondary(&self) -> Result<Option<SearchSettings>>;

    /// Move a generation to a new status.
    async fn set_status(&self, id: SearchSettingsId, status: SearchSettingsStatus) -> Result<()>;

    /// Count pairs that still lack a successful attempt under the given
    /// generation; zero means an index migration may be completed.
    async fn count_pairs_missing_success(&self, id: SearchSettingsId) -> Result<u64>;
}

/// Index-attempt repository.
#[async_trait]
pub trait IndexAttemptRepository: Send + Sync {
    /// Insert a `NotStarted` attempt; returns its id.
    async fn create(&self, attempt: &NewIndexAttempt) -> Result<IndexAttemptId>;

    /// Fetch by id.
    async fn get(&self, id: IndexAttemptId) -> Result<Option<IndexAttempt>>;

    /// The most recent attempt for a unit, any status.
    async fn last_attempt(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
    ) -> Result<Option<IndexAttempt>>;

    /// Most recent terminal attempts for a unit, newest first.
    async fn recent_completed(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        limit: usize,
    ) -> Result<Vec<IndexAttempt>>;

    /// Epoch seconds of the newest successful attempt for the unit, or
    /// `earliest` when none exists.
    async fn last_successful_attempt_time(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        earliest: i64,
    ) -> Result<i64>;

    /// `NotStarted → InProgress`, stamping `started_at`.
    async fn transition_to_in_progress(&self, id: IndexAttemptId) -> Result<IndexAttempt>;

    /// Record the computed poll window.
    async fn set_poll_range(&self, id: IndexAttemptId, start: i64, end: i64) -> Result<()>;

    /// Mark terminal success.
    async fn mark_succeeded(&self, id: IndexAttemptId) -> Result<()>;

    /// Mark terminal partial success.
    async fn mark_partially_succeeded(&self, id: IndexAttemptId) -> Result<()>;

    /// Mark terminal failure. No-op when the attempt is already terminal.
    async fn mark_failed(
        &self,
        id: IndexAttemptId,
        reason: &str,
        full_trace: Option<&str>,
    ) -> Result<()>;

    /// Mark terminal cancellation. No-op when the attempt is already terminal.
    async fn mark_canceled(&self, id: IndexAttemptId, reason: &str) -> Result<()>;

    /// Update progress counters (refreshed every batch for the UI).
    async fn update_docs_indexed(
        &self,
        id: IndexAttemptId,
        total_docs: i64,
        new_docs: i64,
    ) -> Result<()>;

    /// Persist the connector checkpoint blob verbatim.
    async fn save_checkpoint(&self, id: IndexAttemptId, blob: &str) -> Result<()>;

    /// Clear the checkpoint blob (retention cleanup).
    async fn clear_checkpoint(&self, id: IndexAttemptId) -> Result<()>;

    /// All attempts currently `InProgress` (beat validation input).
    async fn in_progress_attempts(&self) -> Result<Vec<IndexAttempt>>;

    /// Terminal attempts older than `cutoff_epoch_secs` that still carry a
    /// checkpoint blob.
    async fn attempts_with_old_checkpoints(&self, cutoff_epoch_secs: i64)
    -> Result<Vec<IndexAttempt>>;

    /// Record a connector/pipeline failure durably.
    async fn create_error(
        &self,
        attempt_id: IndexAttemptId,
        cc_pair: CcPairId,
        failure: &ConnectorFailure,
    ) -> Result<()>;

    /// Unresolved failure rows for a pair.
    async fn unresolved_errors(&self, cc_pair: CcPairId) -> Result<Vec<IndexAttemptError>>;

    /// Resolve failure rows by row id.
    async fn resolve_errors(&self, error_ids: &[i64]) -> Result<()>;
}

/// Opaque guard holding per-document modification locks.
///
/// Dropping the guard releases the locks. Acquisition is in sorted id
/// order to preclude deadlocks between the indexer and sync workers.
pub trait DocumentLockGuard: Send {}

/// Document repository.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Fetch rows for a set of ids (missing ids are simply absent).
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<DocumentRow>>;

    /// Fetch one row.
    async fn get(&self, id: &str) -> Result<Option<DocumentRow>>;

    /// Upsert basic metadata rows (never touches `doc_updated_at`).
    async fn upsert_metadata(&self, docs: &[DocumentMetadata]) -> Result<()>;

    /// Ensure the ccpair→document relationship rows exist.
    async fn upsert_ccpair_relationship(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()>;

    /// Acquire per-document modification locks, in sorted id order.
    async fn prepare_to_modify(&self, ids: &[String]) -> Result<Box<dyn DocumentLockGuard>>;

    /// Count docs as indexed for the pair even when their content was up to
    /// date, so pair and attempt counts stay in parity.
    async fn mark_indexed_for_ccpair(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()>;

    /// Post-write transactional update: `doc_updated_at` advances,
    /// `last_modified` bumps (flagging `needs_sync`), chunk counts and
    /// per-chunk boosts persist, and docs are marked indexed for the pair.
    async fn finalize_indexed_batch(
        &self,
        cc_pair: CcPairId,
        ids_to_new_updated_at: &BTreeMap<String, i64>,
        last_modified_ids: &[String],
        chunk_counts: &BTreeMap<String, i64>,
        chunk_boosts: &[UpdatableChunkData],
        all_batch_ids: &[String],
    ) -> Result<()>;

    /// Chunk counts currently recorded for a set of documents.
    async fn chunk_counts(&self, ids: &[String]) -> Result<BTreeMap<String, i64>>;

    /// Number of documents flagged `needs_sync`.
    async fn count_needs_sync(&self) -> Result<u64>;

    /// Ids of stale (needs-sync) documents for one pair, oldest first.
    async fn stale_document_ids(&self, cc_pair: CcPairId, limit: usize) -> Result<Vec<String>>;

    /// Clear the needs-sync flag after a successful metadata sync.
    async fn mark_synced(&self, id: &str) -> Result<()>;

    /// Access payloads for a set of documents.
    async fn access_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, DocumentAccess>>;

    /// Access payload for one document.
    async fn access_for_document(&self, id: &str) -> Result<DocumentAccess>;

    /// Document-set names for a set of documents.
    async fn document_sets_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, BTreeSet<String>>>;

    /// Document-set names for one document.
    async fn document_sets_for_document(&self, id: &str) -> Result<BTreeSet<String>>;
}

/// Document-set repository.
#[async_trait]
pub trait DocumentSetRepository: Send + Sync {
    /// Insert a set; returns its id.
    async fn create(&self, name: &str) -> Result<DocumentSetId>;

    /// Fetch by id.
    async fn get(&self, id: DocumentSetId) -> Result<Option<DocumentSet>>;

    /// All sets, optionally restricted to outdated ones.
    async fn list(&self, include_up_to_date: bool) -> Result<Vec<DocumentSet>>;

    /// Add a document to a set, flagging the set outdated.
    async fn add_document(&self, id: DocumentSetId, document_id: &str) -> Result<()>;

    /// Document ids affected by a membership change.
    async fn document_ids(&self, id: DocumentSetId) -> Result<Vec<String>>;

    /// Whether any ccpair association remains (dangling sets are deleted).
    async fn has_ccpair_associations(&self, id: DocumentSetId) -> Result<bool>;

    /// Mark the set reflected in the index.
    async fn mark_synced(&self, id: DocumentSetId) -> Result<()>;

    /// Delete a dangling set.
    async fn delete(&self, id: DocumentSetId) -> Result<()>;
}

/// User-group repository.
///
/// The user-group module may be absent from a deployment; the tenant
/// router exposes `None` in that case and the sync coordinator skips the
/// pass.
#[async_trait]
pub trait UserGroupRepository: Send + Sync {
    /// Fetch by id.
    async fn get(&self, id: UserGroupId) -> Result<Option<UserGroup>>;

    /// All groups, optionally restricted to outdated ones.
    async fn list(&self, include_up_to_date: bool) -> Result<Vec<UserGroup>>;

    /// Document ids affected by a group membership change.
    async fn document_ids(&self, id: UserGroupId) -> Result<Vec<String>>;

    /// Mark the group reflected in the index.
    async fn mark_synced(&self, id: UserGroupId) -> Result<()>;
}

/// Sync-record repository.
#[async_trait]
pub trait SyncRecordRepository: Send + Sync {
    /// Insert an `InProgress` record for a pass.
    async fn insert(&self, entity_id: i64, sync_type: SyncType) -> Result<()>;

    /// Update the newest record for the entity/type.
    async fn update_status(
        &self,
        entity_id: i64,
        sync_type: SyncType,
        status: SyncStatus,
        num_docs_synced: i64,
    ) -> Result<()>;

    /// Remove stray `InProgress` records (entity already up to date).
    async fn cleanup(&self, entity_id: i64, sync_type: SyncType) -> Result<()>;

    /// Newest record for the entity/type.
    async fn latest(&self, entity_id: i64, sync_type: SyncType) -> Result<Option<SyncRecord>>;
}

/// Per-tenant repository bundle handed out by the tenant router.
#[derive(Clone)]
pub struct Repositories {
    /// Connector-credential pairs
    pub cc_pairs: Arc<dyn CcPairRepository>,
    /// Search settings generations
    pub search_settings: Arc<dyn SearchSettingsRepository>,
    /// Index attempts + failure records
    pub index_attempts: Arc<dyn IndexAttemptRepository>,
    /// Documents
    pub documents: Arc<dyn DocumentRepository>,
    /// Document sets
    pub document_sets: Arc<dyn DocumentSetRepository>,
    /// User groups (absent when the module is not deployed)
    pub user_groups: Option<Arc<dyn UserGroupRepository>>,
    /// Sync records
    pub sync_records: Arc<dyn SyncRecordRepository>,
}
