//! Mock queue, search index, embedder, connector, and spawner.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use trawl_domain::entities::{
    ConnectorCheckpoint, ConnectorCredentialPair, DocMetadataAwareIndexChunk, Document,
    DocumentAccess, SearchSettings,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    CheckpointedConnector, ConnectorBundle, ConnectorFactory, ConnectorItem, ConnectorRun,
    DocumentIndexFields, EmbedTextKind, EmbeddingProvider, IndexBatchParams, IndexBatchResponse,
    IndexingSpawnArgs, InsertionRecord, ProcessExit, ProcessSpawner, SearchIndexProvider,
    SpawnedProcess, TaskQueue, TaskResultInfo, TaskState, TaskSubmission,
};
use trawl_domain::value_objects::TenantId;

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Recording queue: dispatches are stored, states are test-controlled.
#[derive(Default)]
pub struct MockQueue {
    pub dispatched: Mutex<Vec<(String, TaskSubmission)>>,
    states: Mutex<BTreeMap<String, TaskState>>,
    outcomes: Mutex<BTreeMap<String, TaskResultInfo>>,
}

impl MockQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Force a task's observable state (simulates queue progress).
    pub fn set_state(&self, task_id: &str, state: TaskState) {
        self.states
            .lock()
            .expect("states")
            .insert(task_id.to_owned(), state);
    }

    /// Force a task's terminal outcome.
    pub fn set_outcome(&self, task_id: &str, success: bool, error: Option<&str>) {
        self.outcomes.lock().expect("outcomes").insert(
            task_id.to_owned(),
            TaskResultInfo {
                success,
                error: error.map(str::to_owned),
            },
        );
    }

    /// Dispatched submissions with a given task name.
    pub fn submissions_named(&self, name: &str) -> Vec<(String, TaskSubmission)> {
        self.dispatched
            .lock()
            .expect("dispatched")
            .iter()
            .filter(|(_, s)| s.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskQueue for MockQueue {
    async fn dispatch(&self, submission: TaskSubmission) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.states
            .lock()
            .expect("states")
            .insert(id.clone(), TaskState::Pending);
        self.dispatched
            .lock()
            .expect("dispatched")
            .push((id.clone(), submission));
        Ok(id)
    }

    async fn state(&self, task_id: &str) -> TaskState {
        self.states
            .lock()
            .expect("states")
            .get(task_id)
            .copied()
            .unwrap_or(TaskState::Unknown)
    }

    async fn outcome(&self, task_id: &str) -> Option<TaskResultInfo> {
        self.outcomes.lock().expect("outcomes").get(task_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
struct IndexedDoc {
    chunk_ids: BTreeSet<i64>,
    document_sets: BTreeSet<String>,
    access: DocumentAccess,
    boost: i64,
    hidden: bool,
}

/// In-memory search index with per-document write counters.
#[derive(Default)]
pub struct MockSearchIndex {
    docs: Mutex<BTreeMap<String, IndexedDoc>>,
    write_counts: Mutex<BTreeMap<String, u64>>,
    update_single_calls: Mutex<Vec<String>>,
}

impl MockSearchIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chunk_ids(&self, document_id: &str) -> Vec<i64> {
        self.docs
            .lock()
            .expect("docs")
            .get(document_id)
            .map(|d| d.chunk_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn write_count(&self, document_id: &str) -> u64 {
        self.write_counts
            .lock()
            .expect("counts")
            .get(document_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn document_sets(&self, document_id: &str) -> BTreeSet<String> {
        self.docs
            .lock()
            .expect("docs")
            .get(document_id)
            .map(|d| d.document_sets.clone())
            .unwrap_or_default()
    }

    pub fn update_single_calls(&self, document_id: &str) -> usize {
        self.update_single_calls
            .lock()
            .expect("calls")
            .iter()
            .filter(|d| d.as_str() == document_id)
            .count()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.docs.lock().expect("docs").contains_key(document_id)
    }
}

#[async_trait]
impl SearchIndexProvider for MockSearchIndex {
    async fn ensure_ready(&self, _settings: &SearchSettings) -> Result<()> {
        Ok(())
    }

    async fn index(
        &self,
        _index_name: &str,
        chunks: &[DocMetadataAwareIndexChunk],
        params: &IndexBatchParams,
    ) -> Result<IndexBatchResponse> {
        let mut docs = self.docs.lock().expect("docs");
        let mut counts = self.write_counts.lock().expect("counts");
        let mut response = IndexBatchResponse::default();
        let mut touched = BTreeSet::new();

        for chunk in chunks {
            let id = chunk.chunk.source_document_id.clone();
            let entry = docs.entry(id.clone()).or_default();
            if touched.insert(id.clone()) {
                response.records.push(InsertionRecord {
                    document_id: id.clone(),
                    already_existed: !entry.chunk_ids.is_empty(),
                });
            }
            entry.chunk_ids.insert(chunk.chunk.chunk_id);
            entry.document_sets = chunk.document_sets.clone();
            entry.access = chunk.access.clone();
            entry.boost = chunk.boost;
            *counts.entry(id).or_insert(0) += 1;
        }

        for (document_id, new_count) in &params.doc_id_to_new_chunk_cnt {
            if *new_count == 0 && touched.insert(document_id.clone()) {
                response.records.push(InsertionRecord {
                    document_id: document_id.clone(),
                    already_existed: docs.contains_key(document_id),
                });
            }
            let previous = params
                .doc_id_to_previous_chunk_cnt
                .get(document_id)
                .copied()
                .flatten()
                .unwrap_or(0);
            if previous > *new_count
                && let Some(entry) = docs.get_mut(document_id)
            {
                for stale in *new_count..previous {
                    entry.chunk_ids.remove(&stale);
                }
            }
        }
        Ok(response)
    }

    async fn update_single(
        &self,
        _index_name: &str,
        document_id: &str,
        _tenant_id: &TenantId,
        _chunk_count: Option<i64>,
        fields: &DocumentIndexFields,
    ) -> Result<u64> {
        self.update_single_calls
            .lock()
            .expect("calls")
            .push(document_id.to_owned());
        let mut docs = self.docs.lock().expect("docs");
        let Some(entry) = docs.get_mut(document_id) else {
            return Ok(0);
        };
        if let Some(sets) = &fields.document_sets {
            entry.document_sets = sets.clone();
        }
        if let Some(access) = &fields.access {
            entry.access = access.clone();
        }
        if let Some(boost) = fields.boost {
            entry.boost = boost;
        }
        if let Some(hidden) = fields.hidden {
            entry.hidden = hidden;
        }
        Ok(entry.chunk_ids.len() as u64)
    }

    async fn delete(
        &self,
        _index_name: &str,
        document_id: &str,
        _tenant_id: &TenantId,
    ) -> Result<u64> {
        Ok(self
            .docs
            .lock()
            .expect("docs")
            .remove(document_id)
            .map(|d| d.chunk_ids.len() as u64)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

/// Embedder failing any text that contains a marker from `poison_markers`.
#[derive(Default)]
pub struct MockEmbedder {
    pub poison_markers: Mutex<Vec<String>>,
}

impl MockEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn poison(&self, marker: &str) {
        self.poison_markers
            .lock()
            .expect("markers")
            .push(marker.to_owned());
    }

    pub fn heal(&self) {
        self.poison_markers.lock().expect("markers").clear();
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[String], _kind: EmbedTextKind) -> Result<Vec<Vec<f32>>> {
        let markers = self.poison_markers.lock().expect("markers").clone();
        for text in texts {
            if markers.iter().any(|m| text.contains(m)) {
                return Err(Error::embedding("poisoned text"));
            }
        }
        Ok(texts.iter().map(|_| vec![0.25_f32; 8]).collect())
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Checkpointed connector serving a mutable set of documents in one
/// segment, with optional injected item failures.
#[derive(Default)]
pub struct StaticDocsConnector {
    pub docs: Mutex<Vec<Document>>,
    pub failures: Mutex<Vec<trawl_domain::entities::ConnectorFailure>>,
}

impl StaticDocsConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_docs(&self, docs: Vec<Document>) {
        *self.docs.lock().expect("docs") = docs;
    }

    pub fn push_failure(&self, failure: trawl_domain::entities::ConnectorFailure) {
        self.failures.lock().expect("failures").push(failure);
    }
}

struct StaticRun {
    items: std::collections::VecDeque<ConnectorItem>,
}

#[async_trait]
impl ConnectorRun for StaticRun {
    async fn next(&mut self) -> Result<Option<ConnectorItem>> {
        Ok(self.items.pop_front())
    }

    fn checkpoint(&self) -> ConnectorCheckpoint {
        ConnectorCheckpoint {
            content: serde_json::Value::Null,
            has_more: false,
        }
    }
}

#[async_trait]
impl CheckpointedConnector for Arc<StaticDocsConnector> {
    async fn validate_connector_settings(&self) -> Result<()> {
        Ok(())
    }

    fn build_dummy_checkpoint(&self) -> ConnectorCheckpoint {
        ConnectorCheckpoint::dummy()
    }

    fn validate_checkpoint_json(&self, raw: &str) -> Result<ConnectorCheckpoint> {
        ConnectorCheckpoint::from_json(raw)
    }

    async fn load_from_checkpoint(
        &self,
        _start_epoch: i64,
        _end_epoch: i64,
        _checkpoint: ConnectorCheckpoint,
    ) -> Result<Box<dyn ConnectorRun>> {
        let mut items: Vec<ConnectorItem> = self
            .failures
            .lock()
            .expect("failures")
            .iter()
            .cloned()
            .map(ConnectorItem::Failure)
            .collect();
        items.extend(
            self.docs
                .lock()
                .expect("docs")
                .iter()
                .cloned()
                .map(|d| ConnectorItem::Document(Box::new(d))),
        );
        Ok(Box::new(StaticRun {
            items: items.into(),
        }))
    }
}

/// Factory always returning the same scripted connector.
pub struct StaticFactory {
    connector: Arc<StaticDocsConnector>,
}

impl StaticFactory {
    pub fn new(connector: Arc<StaticDocsConnector>) -> Self {
        Self { connector }
    }
}

impl ConnectorFactory for StaticFactory {
    fn instantiate(&self, _pair: &ConnectorCredentialPair) -> Result<ConnectorBundle> {
        Ok(ConnectorBundle::Checkpointed(Box::new(Arc::clone(
            &self.connector,
        ))))
    }
}

// ---------------------------------------------------------------------------
// Spawner
// ---------------------------------------------------------------------------

/// Handle the test uses to script a fake child's exit.
#[derive(Default)]
pub struct FakeProcessHandle {
    exit: Mutex<Option<ProcessExit>>,
    pub killed: Mutex<bool>,
}

impl FakeProcessHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn finish(&self, exit: ProcessExit) {
        *self.exit.lock().expect("exit") = Some(exit);
    }
}

struct FakeProcess {
    handle: Arc<FakeProcessHandle>,
}

#[async_trait]
impl SpawnedProcess for FakeProcess {
    async fn try_status(&mut self) -> Result<Option<ProcessExit>> {
        Ok(*self.handle.exit.lock().expect("exit"))
    }

    async fn kill(&mut self) -> Result<()> {
        *self.handle.killed.lock().expect("killed") = true;
        *self.handle.exit.lock().expect("exit") = Some(ProcessExit::Signal(9));
        Ok(())
    }

    async fn stderr_tail(&mut self) -> Option<String> {
        None
    }
}

/// Spawner producing processes controlled by a [`FakeProcessHandle`].
pub struct FakeSpawner {
    pub handle: Arc<FakeProcessHandle>,
    pub fail_spawn: Mutex<bool>,
    pub spawned: Mutex<Vec<IndexingSpawnArgs>>,
}

impl FakeSpawner {
    pub fn new(handle: Arc<FakeProcessHandle>) -> Arc<Self> {
        Arc::new(Self {
            handle,
            fail_spawn: Mutex::new(false),
            spawned: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn_indexing(&self, args: &IndexingSpawnArgs) -> Result<Box<dyn SpawnedProcess>> {
        if *self.fail_spawn.lock().expect("fail_spawn") {
            return Err(Error::connector("spawn refused by test"));
        }
        self.spawned.lock().expect("spawned").push(args.clone());
        Ok(Box::new(FakeProcess {
            handle: Arc::clone(&self.handle),
        }))
    }
}
