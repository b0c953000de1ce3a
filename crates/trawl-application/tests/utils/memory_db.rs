//! In-memory implementations of the repository ports.
//!
//! One shared state behind a mutex; all seven repository traits are
//! implemented against it so use cases exercise their real read/write
//! patterns.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use trawl_domain::entities::{
    CcPairStatus, ConnectorCredentialPair, ConnectorFailure, DocumentAccess, DocumentMetadata,
    DocumentRow, DocumentSet, IndexAttempt, IndexAttemptError, IndexAttemptStatus, IndexingTrigger,
    NewIndexAttempt, SearchSettings, SearchSettingsStatus, SyncRecord, SyncStatus, SyncType,
    UpdatableChunkData, UserGroup,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    CcPairRepository, DocumentLockGuard, DocumentRepository, DocumentSetRepository,
    IndexAttemptRepository, Repositories, SearchSettingsRepository, SyncRecordRepository,
    UserGroupRepository,
};
use trawl_domain::utils::time;
use trawl_domain::value_objects::{CcPairId, DocumentSetId, IndexAttemptId, SearchSettingsId, UserGroupId};

#[derive(Default)]
pub struct DbState {
    pub next_id: i64,
    pub pairs: BTreeMap<i64, ConnectorCredentialPair>,
    pub settings: BTreeMap<i64, SearchSettings>,
    pub attempts: BTreeMap<i64, IndexAttempt>,
    pub attempt_errors: BTreeMap<i64, IndexAttemptError>,
    pub documents: BTreeMap<String, DocumentRow>,
    pub doc_ccpairs: BTreeSet<(i64, String)>,
    pub indexed_marks: BTreeSet<(i64, String)>,
    pub chunk_boosts: BTreeMap<(String, i64), f32>,
    pub doc_access: BTreeMap<String, DocumentAccess>,
    pub doc_sets: BTreeMap<i64, DocumentSet>,
    pub set_docs: BTreeSet<(i64, String)>,
    pub set_ccpairs: BTreeSet<(i64, i64)>,
    pub groups: BTreeMap<i64, UserGroup>,
    pub group_docs: BTreeSet<(i64, String)>,
    pub sync_records: Vec<SyncRecord>,
}

impl DbState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory relational state.
#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<DbState>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state for direct inspection/seeding in tests.
    pub fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().expect("db state poisoned")
    }

    /// Build the repository bundle over this state.
    pub fn repositories(&self) -> Repositories {
        Repositories {
            cc_pairs: Arc::new(self.clone()),
            search_settings: Arc::new(self.clone()),
            index_attempts: Arc::new(self.clone()),
            documents: Arc::new(self.clone()),
            document_sets: Arc::new(self.clone()),
            user_groups: Some(Arc::new(self.clone())),
            sync_records: Arc::new(self.clone()),
        }
    }

    /// Seed a pair, returning its id.
    pub fn seed_pair(&self, pair: ConnectorCredentialPair) -> CcPairId {
        let mut state = self.lock();
        let id = pair.id.raw();
        state.next_id = state.next_id.max(id);
        state.pairs.insert(id, pair);
        CcPairId::new(id)
    }

    /// Seed a settings generation, returning its id.
    pub fn seed_settings(&self, settings: SearchSettings) -> SearchSettingsId {
        let mut state = self.lock();
        let id = settings.id.raw();
        state.next_id = state.next_id.max(id);
        state.settings.insert(id, settings);
        SearchSettingsId::new(id)
    }
}

#[async_trait]
impl CcPairRepository for MemoryDb {
    async fn create(&self, pair: &ConnectorCredentialPair) -> Result<CcPairId> {
        let mut state = self.lock();
        let id = state.next_id();
        let mut pair = pair.clone();
        pair.id = CcPairId::new(id);
        state.pairs.insert(id, pair);
        Ok(CcPairId::new(id))
    }

    async fn get(&self, id: CcPairId) -> Result<Option<ConnectorCredentialPair>> {
        Ok(self.lock().pairs.get(&id.raw()).cloned())
    }

    async fn list(&self) -> Result<Vec<ConnectorCredentialPair>> {
        Ok(self.lock().pairs.values().cloned().collect())
    }

    async fn set_status(&self, id: CcPairId, status: CcPairStatus) -> Result<()> {
        if let Some(pair) = self.lock().pairs.get_mut(&id.raw()) {
            pair.status = status;
        }
        Ok(())
    }

    async fn set_indexing_trigger(
        &self,
        id: CcPairId,
        trigger: Option<IndexingTrigger>,
    ) -> Result<()> {
        if let Some(pair) = self.lock().pairs.get_mut(&id.raw()) {
            pair.indexing_trigger = trigger;
        }
        Ok(())
    }

    async fn set_last_successful_index_time(&self, id: CcPairId, epoch_secs: i64) -> Result<()> {
        if let Some(pair) = self.lock().pairs.get_mut(&id.raw()) {
            pair.last_successful_index_time = Some(epoch_secs);
        }
        Ok(())
    }

    async fn set_repeated_error_state(&self, id: CcPairId, value: bool) -> Result<()> {
        if let Some(pair) = self.lock().pairs.get_mut(&id.raw()) {
            pair.in_repeated_error_state = value;
        }
        Ok(())
    }
}

#[async_trait]
impl SearchSettingsRepository for MemoryDb {
    async fn create(&self, settings: &SearchSettings) -> Result<SearchSettingsId> {
        let mut state = self.lock();
        let id = state.next_id();
        let mut settings = settings.clone();
        settings.id = SearchSettingsId::new(id);
        state.settings.insert(id, settings);
        Ok(SearchSettingsId::new(id))
    }

    async fn get(&self, id: SearchSettingsId) -> Result<Option<SearchSettings>> {
        Ok(self.lock().settings.get(&id.raw()).cloned())
    }

    async fn list_active(&self) -> Result<Vec<SearchSettings>> {
        let state = self.lock();
        let mut active: Vec<SearchSettings> = state
            .settings
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    SearchSettingsStatus::Present | SearchSettingsStatus::Future
                )
            })
            .cloned()
            .collect();
        active.sort_by_key(|s| (s.status != SearchSettingsStatus::Present, s.id.raw()));
        Ok(active)
    }

    async fn get_current(&self) -> Result<Option<SearchSettings>> {
        Ok(self
            .lock()
            .settings
            .values()
            .find(|s| s.status == SearchSettingsStatus::Present)
            .cloned())
    }

    async fn get_secondary(&self) -> Result<Option<SearchSettings>> {
        Ok(self
            .lock()
            .settings
            .values()
            .find(|s| s.status == SearchSettingsStatus::Future)
            .cloned())
    }

    async fn set_status(&self, id: SearchSettingsId, status: SearchSettingsStatus) -> Result<()> {
        if let Some(settings) = self.lock().settings.get_mut(&id.raw()) {
            settings.status = status;
        }
        Ok(())
    }

    async fn count_pairs_missing_success(&self, id: SearchSettingsId) -> Result<u64> {
        let state = self.lock();
        let count = state
            .pairs
            .values()
            .filter(|p| p.status != CcPairStatus::Deleting)
            .filter(|p| {
                !state.attempts.values().any(|a| {
                    a.cc_pair_id == p.id
                        && a.search_settings_id == id
                        && matches!(
                            a.status,
                            IndexAttemptStatus::Success | IndexAttemptStatus::PartialSuccess
                        )
                })
            })
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl IndexAttemptRepository for MemoryDb {
    async fn create(&self, attempt: &NewIndexAttempt) -> Result<IndexAttemptId> {
        let mut state = self.lock();
        let id = state.next_id();
        state.attempts.insert(
            id,
            IndexAttempt {
                id: IndexAttemptId::new(id),
                cc_pair_id: attempt.cc_pair_id,
                search_settings_id: attempt.search_settings_id,
                status: IndexAttemptStatus::NotStarted,
                from_beginning: attempt.from_beginning,
                poll_range_start: None,
                poll_range_end: None,
                checkpoint_blob: None,
                error_msg: None,
                full_exception_trace: None,
                total_docs_indexed: 0,
                new_docs_indexed: 0,
                created_at: time::epoch_secs(),
                started_at: None,
                completed_at: None,
            },
        );
        Ok(IndexAttemptId::new(id))
    }

    async fn get(&self, id: IndexAttemptId) -> Result<Option<IndexAttempt>> {
        Ok(self.lock().attempts.get(&id.raw()).cloned())
    }

    async fn last_attempt(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
    ) -> Result<Option<IndexAttempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| a.cc_pair_id == cc_pair && a.search_settings_id == search_settings)
            .max_by_key(|a| a.id.raw())
            .cloned())
    }

    async fn recent_completed(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        limit: usize,
    ) -> Result<Vec<IndexAttempt>> {
        let state = self.lock();
        let mut terminal: Vec<IndexAttempt> = state
            .attempts
            .values()
            .filter(|a| {
                a.cc_pair_id == cc_pair
                    && a.search_settings_id == search_settings
                    && a.status.is_terminal()
            })
            .cloned()
            .collect();
        terminal.sort_by_key(|a| std::cmp::Reverse(a.id.raw()));
        terminal.truncate(limit);
        Ok(terminal)
    }

    async fn last_successful_attempt_time(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        earliest: i64,
    ) -> Result<i64> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| {
                a.cc_pair_id == cc_pair
                    && a.search_settings_id == search_settings
                    && matches!(
                        a.status,
                        IndexAttemptStatus::Success | IndexAttemptStatus::PartialSuccess
                    )
            })
            .filter_map(|a| a.poll_range_end)
            .max()
            .unwrap_or(earliest)
            .max(earliest))
    }

    async fn transition_to_in_progress(&self, id: IndexAttemptId) -> Result<IndexAttempt> {
        let mut state = self.lock();
        let attempt = state
            .attempts
            .get_mut(&id.raw())
            .ok_or_else(|| Error::not_found(format!("index attempt {id}")))?;
        if attempt.status == IndexAttemptStatus::NotStarted {
            attempt.status = IndexAttemptStatus::InProgress;
            attempt.started_at = Some(time::epoch_secs());
        }
        if attempt.status != IndexAttemptStatus::InProgress {
            return Err(Error::database(format!(
                "attempt {id} cannot transition (status {})",
                attempt.status
            )));
        }
        Ok(attempt.clone())
    }

    async fn set_poll_range(&self, id: IndexAttemptId, start: i64, end: i64) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id.raw()) {
            attempt.poll_range_start = Some(start);
            attempt.poll_range_end = Some(end);
        }
        Ok(())
    }

    async fn mark_succeeded(&self, id: IndexAttemptId) -> Result<()> {
        self.mark(id, IndexAttemptStatus::Success, None, None)
    }

    async fn mark_partially_succeeded(&self, id: IndexAttemptId) -> Result<()> {
        self.mark(id, IndexAttemptStatus::PartialSuccess, None, None)
    }

    async fn mark_failed(
        &self,
        id: IndexAttemptId,
        reason: &str,
        full_trace: Option<&str>,
    ) -> Result<()> {
        self.mark(id, IndexAttemptStatus::Failed, Some(reason), full_trace)
    }

    async fn mark_canceled(&self, id: IndexAttemptId, reason: &str) -> Result<()> {
        self.mark(id, IndexAttemptStatus::Canceled, Some(reason), None)
    }

    async fn update_docs_indexed(
        &self,
        id: IndexAttemptId,
        total_docs: i64,
        new_docs: i64,
    ) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id.raw()) {
            attempt.total_docs_indexed = total_docs;
            attempt.new_docs_indexed = new_docs;
        }
        Ok(())
    }

    async fn save_checkpoint(&self, id: IndexAttemptId, blob: &str) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id.raw()) {
            attempt.checkpoint_blob = Some(blob.to_owned());
        }
        Ok(())
    }

    async fn clear_checkpoint(&self, id: IndexAttemptId) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id.raw()) {
            attempt.checkpoint_blob = None;
        }
        Ok(())
    }

    async fn in_progress_attempts(&self) -> Result<Vec<IndexAttempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| !a.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn attempts_with_old_checkpoints(
        &self,
        cutoff_epoch_secs: i64,
    ) -> Result<Vec<IndexAttempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| {
                a.checkpoint_blob.is_some()
                    && a.status.is_terminal()
                    && a.completed_at.unwrap_or(a.created_at) < cutoff_epoch_secs
            })
            .cloned()
            .collect())
    }

    async fn create_error(
        &self,
        attempt_id: IndexAttemptId,
        cc_pair: CcPairId,
        failure: &ConnectorFailure,
    ) -> Result<()> {
        let mut state = self.lock();
        let id = state.next_id();
        state.attempt_errors.insert(
            id,
            IndexAttemptError {
                id,
                index_attempt_id: attempt_id,
                cc_pair_id: cc_pair,
                document_id: failure.failed_document.as_ref().map(|d| d.document_id.clone()),
                entity_id: failure.failed_entity.as_ref().map(|e| e.entity_id.clone()),
                failure_message: failure.failure_message.clone(),
                is_resolved: false,
                created_at: time::epoch_secs(),
            },
        );
        Ok(())
    }

    async fn unresolved_errors(&self, cc_pair: CcPairId) -> Result<Vec<IndexAttemptError>> {
        Ok(self
            .lock()
            .attempt_errors
            .values()
            .filter(|e| e.cc_pair_id == cc_pair && !e.is_resolved)
            .cloned()
            .collect())
    }

    async fn resolve_errors(&self, error_ids: &[i64]) -> Result<()> {
        let mut state = self.lock();
        for id in error_ids {
            if let Some(error) = state.attempt_errors.get_mut(id) {
                error.is_resolved = true;
            }
        }
        Ok(())
    }
}

impl MemoryDb {
    fn mark(
        &self,
        id: IndexAttemptId,
        status: IndexAttemptStatus,
        reason: Option<&str>,
        trace: Option<&str>,
    ) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id.raw())
            && !attempt.status.is_terminal()
        {
            attempt.status = status;
            attempt.completed_at = Some(time::epoch_secs());
            if let Some(reason) = reason {
                attempt.error_msg = Some(reason.to_owned());
            }
            if let Some(trace) = trace {
                attempt.full_exception_trace = Some(trace.to_owned());
            }
        }
        Ok(())
    }
}

struct NoLocks;
impl DocumentLockGuard for NoLocks {}

#[async_trait]
impl DocumentRepository for MemoryDb {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<DocumentRow>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRow>> {
        Ok(self.lock().documents.get(id).cloned())
    }

    async fn upsert_metadata(&self, docs: &[DocumentMetadata]) -> Result<()> {
        let mut state = self.lock();
        for doc in docs {
            state
                .documents
                .entry(doc.document_id.clone())
                .and_modify(|row| row.semantic_identifier = doc.semantic_identifier.clone())
                .or_insert(DocumentRow {
                    id: doc.document_id.clone(),
                    semantic_identifier: doc.semantic_identifier.clone(),
                    doc_updated_at: None,
                    last_modified: time::epoch_secs(),
                    chunk_count: None,
                    boost: 0,
                    hidden: false,
                    needs_sync: false,
                });
        }
        Ok(())
    }

    async fn upsert_ccpair_relationship(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()> {
        let mut state = self.lock();
        for id in ids {
            state.doc_ccpairs.insert((cc_pair.raw(), id.clone()));
        }
        Ok(())
    }

    async fn prepare_to_modify(&self, _ids: &[String]) -> Result<Box<dyn DocumentLockGuard>> {
        Ok(Box::new(NoLocks))
    }

    async fn mark_indexed_for_ccpair(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()> {
        let mut state = self.lock();
        for id in ids {
            state.indexed_marks.insert((cc_pair.raw(), id.clone()));
        }
        Ok(())
    }

    async fn finalize_indexed_batch(
        &self,
        cc_pair: CcPairId,
        ids_to_new_updated_at: &BTreeMap<String, i64>,
        last_modified_ids: &[String],
        chunk_counts: &BTreeMap<String, i64>,
        chunk_boosts: &[UpdatableChunkData],
        all_batch_ids: &[String],
    ) -> Result<()> {
        let mut state = self.lock();
        let ts = time::epoch_secs();
        for (id, updated_at) in ids_to_new_updated_at {
            if let Some(row) = state.documents.get_mut(id) {
                row.doc_updated_at = Some(*updated_at);
            }
        }
        for id in last_modified_ids {
            if let Some(row) = state.documents.get_mut(id) {
                row.last_modified = ts;
                row.needs_sync = true;
            }
        }
        for (id, count) in chunk_counts {
            if let Some(row) = state.documents.get_mut(id) {
                row.chunk_count = Some(*count);
            }
        }
        for boost in chunk_boosts {
            state
                .chunk_boosts
                .insert((boost.document_id.clone(), boost.chunk_id), boost.boost_score);
        }
        for id in all_batch_ids {
            state.indexed_marks.insert((cc_pair.raw(), id.clone()));
        }
        Ok(())
    }

    async fn chunk_counts(&self, ids: &[String]) -> Result<BTreeMap<String, i64>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .documents
                    .get(id)
                    .and_then(|row| row.chunk_count.map(|c| (id.clone(), c)))
            })
            .collect())
    }

    async fn count_needs_sync(&self) -> Result<u64> {
        Ok(self.lock().documents.values().filter(|d| d.needs_sync).count() as u64)
    }

    async fn stale_document_ids(&self, cc_pair: CcPairId, limit: usize) -> Result<Vec<String>> {
        let state = self.lock();
        Ok(state
            .documents
            .values()
            .filter(|d| d.needs_sync)
            .filter(|d| state.doc_ccpairs.contains(&(cc_pair.raw(), d.id.clone())))
            .take(limit)
            .map(|d| d.id.clone())
            .collect())
    }

    async fn mark_synced(&self, id: &str) -> Result<()> {
        if let Some(row) = self.lock().documents.get_mut(id) {
            row.needs_sync = false;
        }
        Ok(())
    }

    async fn access_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, DocumentAccess>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    state.doc_access.get(id).cloned().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn access_for_document(&self, id: &str) -> Result<DocumentAccess> {
        Ok(self.lock().doc_access.get(id).cloned().unwrap_or_default())
    }

    async fn document_sets_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut out = BTreeMap::new();
        for id in ids {
            out.insert(id.clone(), self.document_sets_for_document(id).await?);
        }
        Ok(out)
    }

    async fn document_sets_for_document(&self, id: &str) -> Result<BTreeSet<String>> {
        let state = self.lock();
        Ok(state
            .set_docs
            .iter()
            .filter(|(_, doc)| doc == id)
            .filter_map(|(set_id, _)| state.doc_sets.get(set_id).map(|s| s.name.clone()))
            .collect())
    }
}

#[async_trait]
impl DocumentSetRepository for MemoryDb {
    async fn create(&self, name: &str) -> Result<DocumentSetId> {
        let mut state = self.lock();
        let id = state.next_id();
        state.doc_sets.insert(
            id,
            DocumentSet {
                id: DocumentSetId::new(id),
                name: name.to_owned(),
                is_up_to_date: false,
            },
        );
        Ok(DocumentSetId::new(id))
    }

    async fn get(&self, id: DocumentSetId) -> Result<Option<DocumentSet>> {
        Ok(self.lock().doc_sets.get(&id.raw()).cloned())
    }

    async fn list(&self, include_up_to_date: bool) -> Result<Vec<DocumentSet>> {
        Ok(self
            .lock()
            .doc_sets
            .values()
            .filter(|s| include_up_to_date || !s.is_up_to_date)
            .cloned()
            .collect())
    }

    async fn add_document(&self, id: DocumentSetId, document_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.set_docs.insert((id.raw(), document_id.to_owned()));
        if let Some(set) = state.doc_sets.get_mut(&id.raw()) {
            set.is_up_to_date = false;
        }
        Ok(())
    }

    async fn document_ids(&self, id: DocumentSetId) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .set_docs
            .iter()
            .filter(|(set_id, _)| *set_id == id.raw())
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn has_ccpair_associations(&self, id: DocumentSetId) -> Result<bool> {
        Ok(self
            .lock()
            .set_ccpairs
            .iter()
            .any(|(set_id, _)| *set_id == id.raw()))
    }

    async fn mark_synced(&self, id: DocumentSetId) -> Result<()> {
        if let Some(set) = self.lock().doc_sets.get_mut(&id.raw()) {
            set.is_up_to_date = true;
        }
        Ok(())
    }

    async fn delete(&self, id: DocumentSetId) -> Result<()> {
        let mut state = self.lock();
        state.doc_sets.remove(&id.raw());
        state.set_docs.retain(|(set_id, _)| *set_id != id.raw());
        state.set_ccpairs.retain(|(set_id, _)| *set_id != id.raw());
        Ok(())
    }
}

#[async_trait]
impl UserGroupRepository for MemoryDb {
    async fn get(&self, id: UserGroupId) -> Result<Option<UserGroup>> {
        Ok(self.lock().groups.get(&id.raw()).cloned())
    }

    async fn list(&self, include_up_to_date: bool) -> Result<Vec<UserGroup>> {
        Ok(self
            .lock()
            .groups
            .values()
            .filter(|g| include_up_to_date || !g.is_up_to_date)
            .cloned()
            .collect())
    }

    async fn document_ids(&self, id: UserGroupId) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .group_docs
            .iter()
            .filter(|(group_id, _)| *group_id == id.raw())
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn mark_synced(&self, id: UserGroupId) -> Result<()> {
        if let Some(group) = self.lock().groups.get_mut(&id.raw()) {
            group.is_up_to_date = true;
        }
        Ok(())
    }
}

#[async_trait]
impl SyncRecordRepository for MemoryDb {
    async fn insert(&self, entity_id: i64, sync_type: SyncType) -> Result<()> {
        let mut state = self.lock();
        let id = state.next_id();
        let ts = time::epoch_secs();
        state.sync_records.push(SyncRecord {
            id,
            entity_id,
            sync_type,
            status: SyncStatus::InProgress,
            num_docs_synced: 0,
            created_at: ts,
            updated_at: ts,
        });
        Ok(())
    }

    async fn update_status(
        &self,
        entity_id: i64,
        sync_type: SyncType,
        status: SyncStatus,
        num_docs_synced: i64,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(record) = state
            .sync_records
            .iter_mut()
            .filter(|r| r.entity_id == entity_id && r.sync_type == sync_type)
            .max_by_key(|r| r.id)
        {
            record.status = status;
            record.num_docs_synced = num_docs_synced;
            record.updated_at = time::epoch_secs();
        }
        Ok(())
    }

    async fn cleanup(&self, entity_id: i64, sync_type: SyncType) -> Result<()> {
        self.lock().sync_records.retain(|r| {
            !(r.entity_id == entity_id
                && r.sync_type == sync_type
                && r.status == SyncStatus::InProgress)
        });
        Ok(())
    }

    async fn latest(&self, entity_id: i64, sync_type: SyncType) -> Result<Option<SyncRecord>> {
        Ok(self
            .lock()
            .sync_records
            .iter()
            .filter(|r| r.entity_id == entity_id && r.sync_type == sync_type)
            .max_by_key(|r| r.id)
            .cloned())
    }
}
