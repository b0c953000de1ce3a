//! Search-settings repository.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::{SearchSettings, SearchSettingsStatus};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{DatabaseExecutor, SearchSettingsRepository, SqlParam, SqlRow};
use trawl_domain::value_objects::SearchSettingsId;

use super::common::{parse_enum, req_bool, req_i64, req_string};

const COLUMNS: &str = "id, status, provider_type, model_name, dimensions, index_name, \
     multipass_indexing, chunk_token_limit, enable_contextual_rag";

/// SQLite-backed [`SearchSettingsRepository`].
pub struct SqliteSearchSettingsRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteSearchSettingsRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<SearchSettings> {
        Ok(SearchSettings {
            id: SearchSettingsId::new(req_i64(row, "id")?),
            status: parse_enum(&req_string(row, "status")?, "search settings status")?,
            provider_type: req_string(row, "provider_type")?,
            model_name: req_string(row, "model_name")?,
            dimensions: req_i64(row, "dimensions")? as usize,
            index_name: req_string(row, "index_name")?,
            multipass_indexing: req_bool(row, "multipass_indexing")?,
            chunk_token_limit: req_i64(row, "chunk_token_limit")? as usize,
            enable_contextual_rag: req_bool(row, "enable_contextual_rag")?,
        })
    }

    async fn get_by_status(&self, status: SearchSettingsStatus) -> Result<Option<SearchSettings>> {
        let row = self
            .executor
            .query_one(
                &format!("SELECT {COLUMNS} FROM search_settings WHERE status = ? ORDER BY id DESC"),
                &[SqlParam::String(status.to_string())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }
}

#[async_trait]
impl SearchSettingsRepository for SqliteSearchSettingsRepository {
    async fn create(&self, settings: &SearchSettings) -> Result<SearchSettingsId> {
        let row = self
            .executor
            .query_one(
                "INSERT INTO search_settings \
                 (status, provider_type, model_name, dimensions, index_name, \
                  multipass_indexing, chunk_token_limit, enable_contextual_rag) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                &[
                    SqlParam::String(settings.status.to_string()),
                    SqlParam::String(settings.provider_type.clone()),
                    SqlParam::String(settings.model_name.clone()),
                    SqlParam::I64(settings.dimensions as i64),
                    SqlParam::String(settings.index_name.clone()),
                    SqlParam::Bool(settings.multipass_indexing),
                    SqlParam::I64(settings.chunk_token_limit as i64),
                    SqlParam::Bool(settings.enable_contextual_rag),
                ],
            )
            .await?
            .ok_or_else(|| Error::database("insert returned no id"))?;
        Ok(SearchSettingsId::new(req_i64(row.as_ref(), "id")?))
    }

    async fn get(&self, id: SearchSettingsId) -> Result<Option<SearchSettings>> {
        let row = self
            .executor
            .query_one(
                &format!("SELECT {COLUMNS} FROM search_settings WHERE id = ?"),
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn list_active(&self) -> Result<Vec<SearchSettings>> {
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT {COLUMNS} FROM search_settings WHERE status IN ('present', 'future') \
                     ORDER BY CASE status WHEN 'present' THEN 0 ELSE 1 END, id"
                ),
                &[],
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn get_current(&self) -> Result<Option<SearchSettings>> {
        self.get_by_status(SearchSettingsStatus::Present).await
    }

    async fn get_secondary(&self) -> Result<Option<SearchSettings>> {
        self.get_by_status(SearchSettingsStatus::Future).await
    }

    async fn set_status(&self, id: SearchSettingsId, status: SearchSettingsStatus) -> Result<()> {
        self.executor
            .execute(
                "UPDATE search_settings SET status = ? WHERE id = ?",
                &[
                    SqlParam::String(status.to_string()),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn count_pairs_missing_success(&self, id: SearchSettingsId) -> Result<u64> {
        let row = self
            .executor
            .query_one(
                "SELECT COUNT(*) AS count FROM connector_credential_pair ccp \
                 WHERE ccp.status != 'deleting' AND NOT EXISTS ( \
                     SELECT 1 FROM index_attempt ia \
                     WHERE ia.cc_pair_id = ccp.id AND ia.search_settings_id = ? \
                       AND ia.status IN ('success', 'partial_success'))",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        Ok(row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0)
            .max(0) as u64)
    }
}
