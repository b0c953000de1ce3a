//! Connector-credential pair repository.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::{CcPairStatus, ConnectorCredentialPair, IndexingTrigger};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{CcPairRepository, DatabaseExecutor, SqlParam, SqlRow};
use trawl_domain::value_objects::CcPairId;

use super::common::{parse_enum, req_bool, req_i64, req_string};

const COLUMNS: &str = "id, name, source, connector_config, credential_json, status, \
     indexing_trigger, access_type, refresh_freq_secs, last_successful_index_time, \
     in_repeated_error_state";

/// SQLite-backed [`CcPairRepository`].
pub struct SqliteCcPairRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteCcPairRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<ConnectorCredentialPair> {
        let config_raw = req_string(row, "connector_config")?;
        let credential_raw = req_string(row, "credential_json")?;
        Ok(ConnectorCredentialPair {
            id: CcPairId::new(req_i64(row, "id")?),
            name: req_string(row, "name")?,
            source: parse_enum(&req_string(row, "source")?, "document source")?,
            connector_config: serde_json::from_str(&config_raw)?,
            credential_json: serde_json::from_str(&credential_raw)?,
            status: parse_enum(&req_string(row, "status")?, "cc pair status")?,
            indexing_trigger: row
                .try_get_string("indexing_trigger")?
                .map(|raw| parse_enum(&raw, "indexing trigger"))
                .transpose()?,
            access_type: parse_enum(&req_string(row, "access_type")?, "access type")?,
            refresh_freq_secs: row.try_get_i64("refresh_freq_secs")?,
            last_successful_index_time: row.try_get_i64("last_successful_index_time")?,
            in_repeated_error_state: req_bool(row, "in_repeated_error_state")?,
        })
    }
}

#[async_trait]
impl CcPairRepository for SqliteCcPairRepository {
    async fn create(&self, pair: &ConnectorCredentialPair) -> Result<CcPairId> {
        let row = self
            .executor
            .query_one(
                "INSERT INTO connector_credential_pair \
                 (name, source, connector_config, credential_json, status, indexing_trigger, \
                  access_type, refresh_freq_secs, last_successful_index_time, in_repeated_error_state) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                &[
                    SqlParam::String(pair.name.clone()),
                    SqlParam::String(pair.source.to_string()),
                    SqlParam::String(pair.connector_config.to_string()),
                    SqlParam::String(pair.credential_json.to_string()),
                    SqlParam::String(pair.status.to_string()),
                    pair.indexing_trigger
                        .map_or(SqlParam::Null, |t| SqlParam::String(t.to_string())),
                    SqlParam::String(pair.access_type.to_string()),
                    pair.refresh_freq_secs.map_or(SqlParam::Null, SqlParam::I64),
                    pair.last_successful_index_time
                        .map_or(SqlParam::Null, SqlParam::I64),
                    SqlParam::Bool(pair.in_repeated_error_state),
                ],
            )
            .await?
            .ok_or_else(|| Error::database("insert returned no id"))?;
        Ok(CcPairId::new(req_i64(row.as_ref(), "id")?))
    }

    async fn get(&self, id: CcPairId) -> Result<Option<ConnectorCredentialPair>> {
        let row = self
            .executor
            .query_one(
                &format!("SELECT {COLUMNS} FROM connector_credential_pair WHERE id = ?"),
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn list(&self) -> Result<Vec<ConnectorCredentialPair>> {
        let rows = self
            .executor
            .query_all(
                &format!("SELECT {COLUMNS} FROM connector_credential_pair ORDER BY id"),
                &[],
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn set_status(&self, id: CcPairId, status: CcPairStatus) -> Result<()> {
        self.executor
            .execute(
                "UPDATE connector_credential_pair SET status = ? WHERE id = ?",
                &[
                    SqlParam::String(status.to_string()),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn set_indexing_trigger(
        &self,
        id: CcPairId,
        trigger: Option<IndexingTrigger>,
    ) -> Result<()> {
        self.executor
            .execute(
                "UPDATE connector_credential_pair SET indexing_trigger = ? WHERE id = ?",
                &[
                    trigger.map_or(SqlParam::Null, |t| SqlParam::String(t.to_string())),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn set_last_successful_index_time(&self, id: CcPairId, epoch_secs: i64) -> Result<()> {
        self.executor
            .execute(
                "UPDATE connector_credential_pair SET last_successful_index_time = ? WHERE id = ?",
                &[SqlParam::I64(epoch_secs), SqlParam::I64(id.raw())],
            )
            .await
    }

    async fn set_repeated_error_state(&self, id: CcPairId, value: bool) -> Result<()> {
        self.executor
            .execute(
                "UPDATE connector_credential_pair SET in_repeated_error_state = ? WHERE id = ?",
                &[SqlParam::Bool(value), SqlParam::I64(id.raw())],
            )
            .await
    }
}
