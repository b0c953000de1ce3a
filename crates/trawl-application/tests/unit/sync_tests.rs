//! Sync coordinator scenarios: document-set sync end to end, zero-task
//! convergence, stale-document dedup, and the per-document error policy.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use trawl_application::sync::{check_for_doc_sync, sync_document};
use trawl_application::tasks::{DocSyncPayload, TASK_DOC_SYNC};
use trawl_domain::entities::{
    ChunkEmbeddings, DocAwareChunk, DocMetadataAwareIndexChunk, DocumentAccess, DocumentRow,
    SearchSettings, SyncStatus, SyncType,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    DocumentIndexFields, IndexBatchParams, IndexBatchResponse, SearchIndexProvider,
};
use trawl_domain::utils::time;
use trawl_domain::value_objects::TenantId;

use crate::utils::TestWorld;

fn seed_document_row(world: &TestWorld, id: &str, needs_sync: bool) {
    world.db.lock().documents.insert(
        id.to_owned(),
        DocumentRow {
            id: id.to_owned(),
            semantic_identifier: id.to_owned(),
            doc_updated_at: Some(100),
            last_modified: time::epoch_secs(),
            chunk_count: Some(1),
            boost: 0,
            hidden: false,
            needs_sync,
        },
    );
}

async fn seed_indexed_chunk(world: &TestWorld, doc_id: &str) {
    let chunk = DocMetadataAwareIndexChunk {
        chunk: DocAwareChunk {
            chunk_id: 0,
            source_document_id: doc_id.to_owned(),
            content: "content".to_owned(),
            title_prefix: String::new(),
            metadata_suffix_semantic: String::new(),
            metadata_suffix_keyword: String::new(),
            source_link: None,
            large_chunk_reference_ids: Vec::new(),
            contextual_rag_reserved_tokens: 0,
            doc_summary: None,
            chunk_context: None,
        },
        embeddings: ChunkEmbeddings {
            full_embedding: vec![0.0; 8],
            mini_chunk_embeddings: Vec::new(),
        },
        access: DocumentAccess::public(),
        document_sets: BTreeSet::new(),
        boost: 0,
        aggregated_chunk_boost_factor: 1.0,
        tenant_id: TenantId::default(),
    };
    let mut prev = std::collections::BTreeMap::new();
    prev.insert(doc_id.to_owned(), None);
    let mut new = std::collections::BTreeMap::new();
    new.insert(doc_id.to_owned(), 1i64);
    world
        .search_index
        .index(
            "main_index",
            &[chunk],
            &IndexBatchParams {
                doc_id_to_previous_chunk_cnt: prev,
                doc_id_to_new_chunk_cnt: new,
                tenant_id: TenantId::default(),
                large_chunks_enabled: false,
            },
        )
        .await
        .expect("seed index");
}

/// Execute every queued doc-sync task against the world, like the light
/// workers would.
async fn drain_doc_sync_tasks(world: &TestWorld) -> usize {
    let submissions = world.queue.submissions_named(TASK_DOC_SYNC);
    let mut executed = 0;
    for (_, submission) in &submissions {
        let payload: DocSyncPayload =
            serde_json::from_value(submission.payload.clone()).expect("payload");
        sync_document(&world.ctx, world.search_index.as_ref(), &payload)
            .await
            .expect("sync");
        executed += 1;
    }
    world.queue.dispatched.lock().expect("dispatched").clear();
    executed
}

#[tokio::test]
async fn document_set_sync_flows_to_the_index_exactly_once() {
    let world = TestWorld::new();
    world.seed_default_pair();
    seed_document_row(&world, "D1", false);
    seed_indexed_chunk(&world, "D1").await;

    let set_id = world
        .ctx
        .repos
        .document_sets
        .create("research")
        .await
        .expect("create set");
    world
        .ctx
        .repos
        .document_sets
        .add_document(set_id, "D1")
        .await
        .expect("add");
    world.db.lock().set_ccpairs.insert((set_id.raw(), 1));

    // pass 1: generate
    let stats = check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    assert_eq!(stats.docset_tasks, 1);
    let record = world
        .ctx
        .repos
        .sync_records
        .latest(set_id.raw(), SyncType::DocumentSet)
        .await
        .expect("latest")
        .expect("record");
    assert_eq!(record.status, SyncStatus::InProgress);

    // light workers drain the taskset
    assert_eq!(drain_doc_sync_tasks(&world).await, 1);
    assert_eq!(world.search_index.update_single_calls("D1"), 1);
    assert_eq!(
        world.search_index.document_sets("D1"),
        BTreeSet::from(["research".to_owned()])
    );

    // pass 2: finalize
    check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    let set = world
        .ctx
        .repos
        .document_sets
        .get(set_id)
        .await
        .expect("get")
        .expect("set");
    assert!(set.is_up_to_date);
    let record = world
        .ctx
        .repos
        .sync_records
        .latest(set_id.raw(), SyncType::DocumentSet)
        .await
        .expect("latest")
        .expect("record");
    assert_eq!(record.status, SyncStatus::Success);
    // no second update for the same doc
    assert_eq!(world.search_index.update_single_calls("D1"), 1);
}

#[tokio::test]
async fn empty_document_sets_still_converge_to_up_to_date() {
    let world = TestWorld::new();
    world.seed_default_pair();
    let set_id = world
        .ctx
        .repos
        .document_sets
        .create("empty-set")
        .await
        .expect("create");
    world.db.lock().set_ccpairs.insert((set_id.raw(), 1));

    let stats = check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    assert_eq!(stats.docset_tasks, 0);

    // zero tasks: the fence drains immediately on the next pass
    check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    let set = world
        .ctx
        .repos
        .document_sets
        .get(set_id)
        .await
        .expect("get")
        .expect("set");
    assert!(set.is_up_to_date);
}

#[tokio::test]
async fn stale_documents_are_deduplicated_across_pairs() {
    let world = TestWorld::new();
    world.seed_default_pair();
    world
        .db
        .seed_pair(crate::utils::shared_context::default_pair(2));

    seed_document_row(&world, "D1", true);
    seed_document_row(&world, "D2", true);
    {
        let mut state = world.db.lock();
        // D1 belongs to both pairs, D2 to the first only
        state.doc_ccpairs.insert((1, "D1".to_owned()));
        state.doc_ccpairs.insert((2, "D1".to_owned()));
        state.doc_ccpairs.insert((1, "D2".to_owned()));
    }

    let stats = check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    // shared documents sync once per pass
    assert_eq!(stats.stale_tasks, 2);

    assert_eq!(drain_doc_sync_tasks(&world).await, 2);
    assert_eq!(world.ctx.repos.documents.count_needs_sync().await.expect("count"), 0);

    // finalize clears the global fence
    check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    assert!(
        !world
            .ctx
            .kv
            .exists(trawl_domain::constants::keys::CCPAIR_SYNC_FENCE)
            .await
            .expect("exists")
    );
}

#[tokio::test]
async fn zero_stale_documents_generate_no_global_fence() {
    let world = TestWorld::new();
    world.seed_default_pair();
    seed_document_row(&world, "D1", false);

    let stats = check_for_doc_sync(&world.ctx, world.queue.as_ref())
        .await
        .expect("pass")
        .expect("ran");
    assert_eq!(stats.stale_tasks, 0);
    assert!(
        !world
            .ctx
            .kv
            .exists(trawl_domain::constants::keys::CCPAIR_SYNC_FENCE)
            .await
            .expect("exists")
    );
}

/// Index stub with a scripted error sequence for the retry-policy tests.
struct FlakyIndex {
    failures_before_success: AtomicU32,
    status: u16,
    calls: AtomicU32,
}

#[async_trait]
impl SearchIndexProvider for FlakyIndex {
    async fn ensure_ready(&self, _settings: &SearchSettings) -> Result<()> {
        Ok(())
    }

    async fn index(
        &self,
        _index_name: &str,
        _chunks: &[DocMetadataAwareIndexChunk],
        _params: &IndexBatchParams,
    ) -> Result<IndexBatchResponse> {
        Ok(IndexBatchResponse::default())
    }

    async fn update_single(
        &self,
        _index_name: &str,
        _document_id: &str,
        _tenant_id: &TenantId,
        _chunk_count: Option<i64>,
        _fields: &DocumentIndexFields,
    ) -> Result<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success.load(Ordering::SeqCst) {
            return Err(Error::search_index_status("scripted failure", self.status));
        }
        Ok(1)
    }

    async fn delete(
        &self,
        _index_name: &str,
        _document_id: &str,
        _tenant_id: &TenantId,
    ) -> Result<u64> {
        Ok(0)
    }
}

async fn payload(world: &TestWorld, doc: &str) -> DocSyncPayload {
    let member = "member-1".to_owned();
    let taskset_key = "trawl:docset:taskset:1".to_owned();
    world
        .ctx
        .kv
        .sadd(&taskset_key, &member)
        .await
        .expect("sadd");
    DocSyncPayload {
        document_id: doc.to_owned(),
        taskset_key,
        taskset_member: member,
    }
}

#[tokio::test]
async fn bad_request_is_not_retried_but_frees_the_taskset() {
    let world = TestWorld::new();
    world.seed_default_pair();
    seed_document_row(&world, "D1", true);

    let index = FlakyIndex {
        failures_before_success: AtomicU32::new(u32::MAX),
        status: 400,
        calls: AtomicU32::new(0),
    };
    let task = payload(&world, "D1").await;
    let err = sync_document(&world.ctx, &index, &task)
        .await
        .expect_err("must fail");
    assert_eq!(err.index_status(), Some(400));
    // exactly one call per active settings generation: no retries
    assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    // the taskset member is gone so the fence can converge
    assert!(
        !world
            .ctx
            .kv
            .sismember(&task.taskset_key, &task.taskset_member)
            .await
            .expect("sismember")
    );
    // the document stays stale for a later pass
    assert_eq!(world.ctx.repos.documents.count_needs_sync().await.expect("count"), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_index_errors_back_off_and_recover() {
    let world = TestWorld::new();
    world.seed_default_pair();
    seed_document_row(&world, "D1", true);

    let index = FlakyIndex {
        failures_before_success: AtomicU32::new(1),
        status: 503,
        calls: AtomicU32::new(0),
    };
    let task = payload(&world, "D1").await;
    let synced = sync_document(&world.ctx, &index, &task)
        .await
        .expect("sync");
    assert!(synced);
    assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    assert_eq!(world.ctx.repos.documents.count_needs_sync().await.expect("count"), 0);
}
