//! Schema definition.

use trawl_domain::error::Result;
use trawl_domain::ports::DatabaseExecutor;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS connector_credential_pair (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        source TEXT NOT NULL,
        connector_config TEXT NOT NULL DEFAULT '{}',
        credential_json TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'active',
        indexing_trigger TEXT,
        access_type TEXT NOT NULL DEFAULT 'public',
        refresh_freq_secs INTEGER,
        last_successful_index_time INTEGER,
        in_repeated_error_state INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS search_settings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL,
        provider_type TEXT NOT NULL,
        model_name TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        index_name TEXT NOT NULL,
        multipass_indexing INTEGER NOT NULL DEFAULT 0,
        chunk_token_limit INTEGER NOT NULL DEFAULT 512,
        enable_contextual_rag INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS index_attempt (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cc_pair_id INTEGER NOT NULL,
        search_settings_id INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'not_started',
        from_beginning INTEGER NOT NULL DEFAULT 0,
        poll_range_start INTEGER,
        poll_range_end INTEGER,
        checkpoint_blob TEXT,
        error_msg TEXT,
        full_exception_trace TEXT,
        total_docs_indexed INTEGER NOT NULL DEFAULT 0,
        new_docs_indexed INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        started_at INTEGER,
        completed_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS ix_index_attempt_unit
        ON index_attempt (cc_pair_id, search_settings_id, id)",
    "CREATE TABLE IF NOT EXISTS index_attempt_error (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        index_attempt_id INTEGER NOT NULL,
        cc_pair_id INTEGER NOT NULL,
        document_id TEXT,
        entity_id TEXT,
        failure_message TEXT NOT NULL,
        is_resolved INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_index_attempt_error_ccpair
        ON index_attempt_error (cc_pair_id, is_resolved)",
    "CREATE TABLE IF NOT EXISTS document (
        id TEXT PRIMARY KEY,
        semantic_identifier TEXT NOT NULL,
        first_link TEXT,
        source TEXT NOT NULL,
        from_ingestion_api INTEGER NOT NULL DEFAULT 0,
        primary_owners TEXT NOT NULL DEFAULT '[]',
        secondary_owners TEXT NOT NULL DEFAULT '[]',
        doc_updated_at INTEGER,
        last_modified INTEGER NOT NULL,
        chunk_count INTEGER,
        boost INTEGER NOT NULL DEFAULT 0,
        hidden INTEGER NOT NULL DEFAULT 0,
        needs_sync INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS ix_document_needs_sync
        ON document (needs_sync, last_modified)",
    "CREATE TABLE IF NOT EXISTS document_by_cc_pair (
        cc_pair_id INTEGER NOT NULL,
        document_id TEXT NOT NULL,
        has_been_indexed INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (cc_pair_id, document_id)
    )",
    "CREATE TABLE IF NOT EXISTS chunk_boost (
        document_id TEXT NOT NULL,
        chunk_id INTEGER NOT NULL,
        boost_score REAL NOT NULL,
        PRIMARY KEY (document_id, chunk_id)
    )",
    "CREATE TABLE IF NOT EXISTS document_set (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        is_up_to_date INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS document_set__document (
        document_set_id INTEGER NOT NULL,
        document_id TEXT NOT NULL,
        PRIMARY KEY (document_set_id, document_id)
    )",
    "CREATE TABLE IF NOT EXISTS document_set__ccpair (
        document_set_id INTEGER NOT NULL,
        cc_pair_id INTEGER NOT NULL,
        PRIMARY KEY (document_set_id, cc_pair_id)
    )",
    "CREATE TABLE IF NOT EXISTS user_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        is_up_to_date INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS user_group__document (
        user_group_id INTEGER NOT NULL,
        document_id TEXT NOT NULL,
        PRIMARY KEY (user_group_id, document_id)
    )",
    "CREATE TABLE IF NOT EXISTS sync_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id INTEGER NOT NULL,
        sync_type TEXT NOT NULL,
        status TEXT NOT NULL,
        num_docs_synced INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_sync_record_entity
        ON sync_record (entity_id, sync_type, id)",
];

/// Apply the schema (idempotent).
pub async fn initialize_schema(executor: &dyn DatabaseExecutor) -> Result<()> {
    for statement in SCHEMA {
        executor.execute(statement, &[]).await?;
    }
    Ok(())
}
