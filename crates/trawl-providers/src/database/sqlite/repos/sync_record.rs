//! Sync-record repository.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::{SyncRecord, SyncStatus, SyncType};
use trawl_domain::error::Result;
use trawl_domain::ports::{DatabaseExecutor, SqlParam, SqlRow, SyncRecordRepository};

use super::common::{now, parse_enum, req_i64, req_string};

/// SQLite-backed [`SyncRecordRepository`].
pub struct SqliteSyncRecordRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteSyncRecordRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<SyncRecord> {
        Ok(SyncRecord {
            id: req_i64(row, "id")?,
            entity_id: req_i64(row, "entity_id")?,
            sync_type: parse_enum(&req_string(row, "sync_type")?, "sync type")?,
            status: parse_enum(&req_string(row, "status")?, "sync status")?,
            num_docs_synced: req_i64(row, "num_docs_synced")?,
            created_at: req_i64(row, "created_at")?,
            updated_at: req_i64(row, "updated_at")?,
        })
    }
}

#[async_trait]
impl SyncRecordRepository for SqliteSyncRecordRepository {
    async fn insert(&self, entity_id: i64, sync_type: SyncType) -> Result<()> {
        let ts = now();
        self.executor
            .execute(
                "INSERT INTO sync_record (entity_id, sync_type, status, created_at, updated_at) \
                 VALUES (?, ?, 'in_progress', ?, ?)",
                &[
                    SqlParam::I64(entity_id),
                    SqlParam::String(sync_type.to_string()),
                    SqlParam::I64(ts),
                    SqlParam::I64(ts),
                ],
            )
            .await
    }

    async fn update_status(
        &self,
        entity_id: i64,
        sync_type: SyncType,
        status: SyncStatus,
        num_docs_synced: i64,
    ) -> Result<()> {
        self.executor
            .execute(
                "UPDATE sync_record SET status = ?, num_docs_synced = ?, updated_at = ? \
                 WHERE id = (SELECT MAX(id) FROM sync_record WHERE entity_id = ? AND sync_type = ?)",
                &[
                    SqlParam::String(status.to_string()),
                    SqlParam::I64(num_docs_synced),
                    SqlParam::I64(now()),
                    SqlParam::I64(entity_id),
                    SqlParam::String(sync_type.to_string()),
                ],
            )
            .await
    }

    async fn cleanup(&self, entity_id: i64, sync_type: SyncType) -> Result<()> {
        self.executor
            .execute(
                "DELETE FROM sync_record \
                 WHERE entity_id = ? AND sync_type = ? AND status = 'in_progress'",
                &[
                    SqlParam::I64(entity_id),
                    SqlParam::String(sync_type.to_string()),
                ],
            )
            .await
    }

    async fn latest(&self, entity_id: i64, sync_type: SyncType) -> Result<Option<SyncRecord>> {
        let row = self
            .executor
            .query_one(
                "SELECT id, entity_id, sync_type, status, num_docs_synced, created_at, updated_at \
                 FROM sync_record WHERE entity_id = ? AND sync_type = ? ORDER BY id DESC",
                &[
                    SqlParam::I64(entity_id),
                    SqlParam::String(sync_type.to_string()),
                ],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }
}
