//! SQLite repository round-trips against an in-memory database.

use std::collections::BTreeMap;

use trawl_domain::entities::{
    AccessType, CcPairStatus, ConnectorCredentialPair, ConnectorFailure, DocumentMetadata,
    DocumentSource, IndexAttemptStatus, IndexingTrigger, NewIndexAttempt, SearchSettings,
    SearchSettingsStatus, SyncStatus, SyncType, UpdatableChunkData,
};
use trawl_domain::ports::Repositories;
use trawl_domain::value_objects::CcPairId;
use trawl_providers::database::sqlite;

async fn repos() -> Repositories {
    let executor = sqlite::connect_in_memory().await.expect("connect");
    sqlite::build_repositories(executor)
}

fn pair() -> ConnectorCredentialPair {
    ConnectorCredentialPair {
        id: CcPairId::new(0),
        name: "wiki pair".to_owned(),
        source: DocumentSource::Wiki,
        connector_config: serde_json::json!({"base_url": "http://wiki.local"}),
        credential_json: serde_json::json!({"token": "t"}),
        status: CcPairStatus::Active,
        indexing_trigger: None,
        access_type: AccessType::Public,
        refresh_freq_secs: Some(3600),
        last_successful_index_time: None,
        in_repeated_error_state: false,
    }
}

fn settings(status: SearchSettingsStatus) -> SearchSettings {
    SearchSettings {
        id: trawl_domain::value_objects::SearchSettingsId::new(0),
        status,
        provider_type: "hash".to_owned(),
        model_name: "hash-384".to_owned(),
        dimensions: 384,
        index_name: "main".to_owned(),
        multipass_indexing: false,
        chunk_token_limit: 512,
        enable_contextual_rag: false,
    }
}

#[tokio::test]
async fn ccpair_round_trips_with_enums_intact() {
    let repos = repos().await;
    let id = repos.cc_pairs.create(&pair()).await.expect("create");

    let loaded = repos.cc_pairs.get(id).await.expect("get").expect("pair");
    assert_eq!(loaded.name, "wiki pair");
    assert_eq!(loaded.source, DocumentSource::Wiki);
    assert_eq!(loaded.status, CcPairStatus::Active);
    assert_eq!(loaded.access_type, AccessType::Public);
    assert_eq!(loaded.connector_config["base_url"], "http://wiki.local");

    repos
        .cc_pairs
        .set_indexing_trigger(id, Some(IndexingTrigger::Reindex))
        .await
        .expect("trigger");
    repos
        .cc_pairs
        .set_repeated_error_state(id, true)
        .await
        .expect("error state");
    let loaded = repos.cc_pairs.get(id).await.expect("get").expect("pair");
    assert_eq!(loaded.indexing_trigger, Some(IndexingTrigger::Reindex));
    assert!(loaded.in_repeated_error_state);
}

#[tokio::test]
async fn search_settings_ordering_and_swap_counting() {
    let repos = repos().await;
    let present = repos
        .search_settings
        .create(&settings(SearchSettingsStatus::Present))
        .await
        .expect("create");
    let future = repos
        .search_settings
        .create(&settings(SearchSettingsStatus::Future))
        .await
        .expect("create");

    let active = repos.search_settings.list_active().await.expect("list");
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].id, present);
    assert_eq!(active[1].id, future);

    let pair_id = repos.cc_pairs.create(&pair()).await.expect("create");
    // no successful attempt under the future generation yet
    assert_eq!(
        repos
            .search_settings
            .count_pairs_missing_success(future)
            .await
            .expect("count"),
        1
    );

    let attempt = repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: pair_id,
            search_settings_id: future,
            from_beginning: false,
        })
        .await
        .expect("create");
    repos
        .index_attempts
        .transition_to_in_progress(attempt)
        .await
        .expect("transition");
    repos.index_attempts.mark_succeeded(attempt).await.expect("succeed");

    assert_eq!(
        repos
            .search_settings
            .count_pairs_missing_success(future)
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn attempt_terminal_states_are_immutable() {
    let repos = repos().await;
    let pair_id = repos.cc_pairs.create(&pair()).await.expect("create");
    let settings_id = repos
        .search_settings
        .create(&settings(SearchSettingsStatus::Present))
        .await
        .expect("create");

    let attempt = repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: pair_id,
            search_settings_id: settings_id,
            from_beginning: false,
        })
        .await
        .expect("create");
    repos
        .index_attempts
        .transition_to_in_progress(attempt)
        .await
        .expect("transition");
    repos
        .index_attempts
        .mark_canceled(attempt, "operator stop")
        .await
        .expect("cancel");

    // a late failure report must not clobber the cancellation
    repos
        .index_attempts
        .mark_failed(attempt, "late watchdog report", None)
        .await
        .expect("mark");
    let loaded = repos
        .index_attempts
        .get(attempt)
        .await
        .expect("get")
        .expect("attempt");
    assert_eq!(loaded.status, IndexAttemptStatus::Canceled);
    assert_eq!(loaded.error_msg.as_deref(), Some("operator stop"));
}

#[tokio::test]
async fn attempt_errors_resolve_by_row_id() {
    let repos = repos().await;
    let pair_id = repos.cc_pairs.create(&pair()).await.expect("create");
    let settings_id = repos
        .search_settings
        .create(&settings(SearchSettingsStatus::Present))
        .await
        .expect("create");
    let attempt = repos
        .index_attempts
        .create(&NewIndexAttempt {
            cc_pair_id: pair_id,
            search_settings_id: settings_id,
            from_beginning: false,
        })
        .await
        .expect("create");

    repos
        .index_attempts
        .create_error(
            attempt,
            pair_id,
            &ConnectorFailure::for_document("D1", None, "embed failed"),
        )
        .await
        .expect("error");
    repos
        .index_attempts
        .create_error(
            attempt,
            pair_id,
            &ConnectorFailure::for_entity("space-9", "unreachable"),
        )
        .await
        .expect("error");

    let unresolved = repos
        .index_attempts
        .unresolved_errors(pair_id)
        .await
        .expect("unresolved");
    assert_eq!(unresolved.len(), 2);

    let doc_error_ids: Vec<i64> = unresolved
        .iter()
        .filter(|e| e.document_id.is_some())
        .map(|e| e.id)
        .collect();
    repos
        .index_attempts
        .resolve_errors(&doc_error_ids)
        .await
        .expect("resolve");

    let unresolved = repos
        .index_attempts
        .unresolved_errors(pair_id)
        .await
        .expect("unresolved");
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].entity_id.as_deref(), Some("space-9"));
}

#[tokio::test]
async fn document_lifecycle_finalize_and_sync_flags() {
    let repos = repos().await;
    let pair_id = repos.cc_pairs.create(&pair()).await.expect("create");

    let metadata = vec![DocumentMetadata {
        cc_pair_id: pair_id,
        document_id: "D1".to_owned(),
        semantic_identifier: "Doc One".to_owned(),
        first_link: Some("http://wiki.local/D1".to_owned()),
        primary_owners: vec!["kai@x.io".to_owned()],
        secondary_owners: vec![],
        from_ingestion_api: false,
        source: DocumentSource::Wiki,
    }];
    repos.documents.upsert_metadata(&metadata).await.expect("upsert");
    repos
        .documents
        .upsert_ccpair_relationship(pair_id, &["D1".to_owned()])
        .await
        .expect("relationship");

    // prepare never touches doc_updated_at
    let row = repos.documents.get("D1").await.expect("get").expect("row");
    assert_eq!(row.doc_updated_at, None);
    assert!(!row.needs_sync);

    let mut updated_at = BTreeMap::new();
    updated_at.insert("D1".to_owned(), 1_704_000_000i64);
    let mut chunk_counts = BTreeMap::new();
    chunk_counts.insert("D1".to_owned(), 3i64);
    repos
        .documents
        .finalize_indexed_batch(
            pair_id,
            &updated_at,
            &["D1".to_owned()],
            &chunk_counts,
            &[UpdatableChunkData {
                document_id: "D1".to_owned(),
                chunk_id: 0,
                boost_score: 0.8,
            }],
            &["D1".to_owned()],
        )
        .await
        .expect("finalize");

    let row = repos.documents.get("D1").await.expect("get").expect("row");
    assert_eq!(row.doc_updated_at, Some(1_704_000_000));
    assert_eq!(row.chunk_count, Some(3));
    assert!(row.needs_sync);

    assert_eq!(repos.documents.count_needs_sync().await.expect("count"), 1);
    assert_eq!(
        repos
            .documents
            .stale_document_ids(pair_id, 10)
            .await
            .expect("stale"),
        vec!["D1".to_owned()]
    );

    repos.documents.mark_synced("D1").await.expect("synced");
    assert_eq!(repos.documents.count_needs_sync().await.expect("count"), 0);

    // access derives from the public pair and the stored owners
    let access = repos
        .documents
        .access_for_document("D1")
        .await
        .expect("access");
    assert!(access.is_public);
    assert!(access.user_emails.contains("kai@x.io"));
}

#[tokio::test]
async fn document_sets_membership_and_danglers() {
    let repos = repos().await;
    let pair_id = repos.cc_pairs.create(&pair()).await.expect("create");
    let metadata = vec![DocumentMetadata {
        cc_pair_id: pair_id,
        document_id: "D1".to_owned(),
        semantic_identifier: "Doc One".to_owned(),
        first_link: None,
        primary_owners: vec![],
        secondary_owners: vec![],
        from_ingestion_api: false,
        source: DocumentSource::Wiki,
    }];
    repos.documents.upsert_metadata(&metadata).await.expect("upsert");

    let set_id = repos.document_sets.create("research").await.expect("create");
    repos
        .document_sets
        .add_document(set_id, "D1")
        .await
        .expect("add");

    let sets = repos
        .documents
        .document_sets_for_document("D1")
        .await
        .expect("sets");
    assert!(sets.contains("research"));

    // no ccpair associations: the set is dangling and deletable
    assert!(
        !repos
            .document_sets
            .has_ccpair_associations(set_id)
            .await
            .expect("assoc")
    );
    repos.document_sets.delete(set_id).await.expect("delete");
    assert!(repos.document_sets.get(set_id).await.expect("get").is_none());
    assert!(
        repos
            .documents
            .document_sets_for_document("D1")
            .await
            .expect("sets")
            .is_empty()
    );
}

#[tokio::test]
async fn sync_records_track_the_latest_pass() {
    let repos = repos().await;
    repos
        .sync_records
        .insert(42, SyncType::DocumentSet)
        .await
        .expect("insert");
    repos
        .sync_records
        .update_status(42, SyncType::DocumentSet, SyncStatus::Success, 7)
        .await
        .expect("update");

    let record = repos
        .sync_records
        .latest(42, SyncType::DocumentSet)
        .await
        .expect("latest")
        .expect("record");
    assert_eq!(record.status, SyncStatus::Success);
    assert_eq!(record.num_docs_synced, 7);

    // cleanup removes only in-progress strays
    repos
        .sync_records
        .insert(42, SyncType::DocumentSet)
        .await
        .expect("insert");
    repos
        .sync_records
        .cleanup(42, SyncType::DocumentSet)
        .await
        .expect("cleanup");
    let record = repos
        .sync_records
        .latest(42, SyncType::DocumentSet)
        .await
        .expect("latest")
        .expect("record");
    assert_eq!(record.status, SyncStatus::Success);
}
