//! Index-attempt repository.
//!
//! Terminal statuses are immutable: every transition statement is guarded
//! by a status predicate, so a late watchdog write can never clobber what
//! the child already recorded.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::{
    ConnectorFailure, IndexAttempt, IndexAttemptError, NewIndexAttempt,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{DatabaseExecutor, IndexAttemptRepository, SqlParam, SqlRow};
use trawl_domain::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId};

use super::common::{now, parse_enum, req_bool, req_i64, req_string};

const COLUMNS: &str = "id, cc_pair_id, search_settings_id, status, from_beginning, \
     poll_range_start, poll_range_end, checkpoint_blob, error_msg, full_exception_trace, \
     total_docs_indexed, new_docs_indexed, created_at, started_at, completed_at";

const TERMINAL: &str = "('success', 'partial_success', 'failed', 'canceled')";

/// SQLite-backed [`IndexAttemptRepository`].
pub struct SqliteIndexAttemptRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteIndexAttemptRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<IndexAttempt> {
        Ok(IndexAttempt {
            id: IndexAttemptId::new(req_i64(row, "id")?),
            cc_pair_id: CcPairId::new(req_i64(row, "cc_pair_id")?),
            search_settings_id: SearchSettingsId::new(req_i64(row, "search_settings_id")?),
            status: parse_enum(&req_string(row, "status")?, "index attempt status")?,
            from_beginning: req_bool(row, "from_beginning")?,
            poll_range_start: row.try_get_i64("poll_range_start")?,
            poll_range_end: row.try_get_i64("poll_range_end")?,
            checkpoint_blob: row.try_get_string("checkpoint_blob")?,
            error_msg: row.try_get_string("error_msg")?,
            full_exception_trace: row.try_get_string("full_exception_trace")?,
            total_docs_indexed: req_i64(row, "total_docs_indexed")?,
            new_docs_indexed: req_i64(row, "new_docs_indexed")?,
            created_at: req_i64(row, "created_at")?,
            started_at: row.try_get_i64("started_at")?,
            completed_at: row.try_get_i64("completed_at")?,
        })
    }

    fn error_from_row(row: &dyn SqlRow) -> Result<IndexAttemptError> {
        Ok(IndexAttemptError {
            id: req_i64(row, "id")?,
            index_attempt_id: IndexAttemptId::new(req_i64(row, "index_attempt_id")?),
            cc_pair_id: CcPairId::new(req_i64(row, "cc_pair_id")?),
            document_id: row.try_get_string("document_id")?,
            entity_id: row.try_get_string("entity_id")?,
            failure_message: req_string(row, "failure_message")?,
            is_resolved: req_bool(row, "is_resolved")?,
            created_at: req_i64(row, "created_at")?,
        })
    }

    async fn mark_terminal(
        &self,
        id: IndexAttemptId,
        status: &str,
        error_msg: Option<&str>,
        full_trace: Option<&str>,
    ) -> Result<()> {
        self.executor
            .execute(
                &format!(
                    "UPDATE index_attempt SET status = ?, error_msg = COALESCE(?, error_msg), \
                     full_exception_trace = COALESCE(?, full_exception_trace), completed_at = ? \
                     WHERE id = ? AND status NOT IN {TERMINAL}"
                ),
                &[
                    SqlParam::String(status.to_owned()),
                    error_msg.map_or(SqlParam::Null, |m| SqlParam::String(m.to_owned())),
                    full_trace.map_or(SqlParam::Null, |t| SqlParam::String(t.to_owned())),
                    SqlParam::I64(now()),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }
}

#[async_trait]
impl IndexAttemptRepository for SqliteIndexAttemptRepository {
    async fn create(&self, attempt: &NewIndexAttempt) -> Result<IndexAttemptId> {
        let row = self
            .executor
            .query_one(
                "INSERT INTO index_attempt \
                 (cc_pair_id, search_settings_id, status, from_beginning, created_at) \
                 VALUES (?, ?, 'not_started', ?, ?) RETURNING id",
                &[
                    SqlParam::I64(attempt.cc_pair_id.raw()),
                    SqlParam::I64(attempt.search_settings_id.raw()),
                    SqlParam::Bool(attempt.from_beginning),
                    SqlParam::I64(now()),
                ],
            )
            .await?
            .ok_or_else(|| Error::database("insert returned no id"))?;
        Ok(IndexAttemptId::new(req_i64(row.as_ref(), "id")?))
    }

    async fn get(&self, id: IndexAttemptId) -> Result<Option<IndexAttempt>> {
        let row = self
            .executor
            .query_one(
                &format!("SELECT {COLUMNS} FROM index_attempt WHERE id = ?"),
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn last_attempt(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
    ) -> Result<Option<IndexAttempt>> {
        let row = self
            .executor
            .query_one(
                &format!(
                    "SELECT {COLUMNS} FROM index_attempt \
                     WHERE cc_pair_id = ? AND search_settings_id = ? ORDER BY id DESC"
                ),
                &[
                    SqlParam::I64(cc_pair.raw()),
                    SqlParam::I64(search_settings.raw()),
                ],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn recent_completed(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        limit: usize,
    ) -> Result<Vec<IndexAttempt>> {
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT {COLUMNS} FROM index_attempt \
                     WHERE cc_pair_id = ? AND search_settings_id = ? AND status IN {TERMINAL} \
                     ORDER BY id DESC LIMIT ?"
                ),
                &[
                    SqlParam::I64(cc_pair.raw()),
                    SqlParam::I64(search_settings.raw()),
                    SqlParam::I64(limit as i64),
                ],
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn last_successful_attempt_time(
        &self,
        cc_pair: CcPairId,
        search_settings: SearchSettingsId,
        earliest: i64,
    ) -> Result<i64> {
        let row = self
            .executor
            .query_one(
                "SELECT MAX(poll_range_end) AS latest FROM index_attempt \
                 WHERE cc_pair_id = ? AND search_settings_id = ? \
                   AND status IN ('success', 'partial_success')",
                &[
                    SqlParam::I64(cc_pair.raw()),
                    SqlParam::I64(search_settings.raw()),
                ],
            )
            .await?;
        Ok(row
            .and_then(|r| r.try_get_i64("latest").ok().flatten())
            .unwrap_or(earliest)
            .max(earliest))
    }

    async fn transition_to_in_progress(&self, id: IndexAttemptId) -> Result<IndexAttempt> {
        self.executor
            .execute(
                "UPDATE index_attempt SET status = 'in_progress', started_at = ? \
                 WHERE id = ? AND status = 'not_started'",
                &[SqlParam::I64(now()), SqlParam::I64(id.raw())],
            )
            .await?;
        let attempt = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("index attempt {id}")))?;
        if attempt.status != trawl_domain::entities::IndexAttemptStatus::InProgress {
            return Err(Error::database(format!(
                "index attempt {id} could not transition to in_progress (status is {})",
                attempt.status
            )));
        }
        Ok(attempt)
    }

    async fn set_poll_range(&self, id: IndexAttemptId, start: i64, end: i64) -> Result<()> {
        self.executor
            .execute(
                "UPDATE index_attempt SET poll_range_start = ?, poll_range_end = ? WHERE id = ?",
                &[
                    SqlParam::I64(start),
                    SqlParam::I64(end),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn mark_succeeded(&self, id: IndexAttemptId) -> Result<()> {
        self.mark_terminal(id, "success", None, None).await
    }

    async fn mark_partially_succeeded(&self, id: IndexAttemptId) -> Result<()> {
        self.mark_terminal(id, "partial_success", None, None).await
    }

    async fn mark_failed(
        &self,
        id: IndexAttemptId,
        reason: &str,
        full_trace: Option<&str>,
    ) -> Result<()> {
        self.mark_terminal(id, "failed", Some(reason), full_trace)
            .await
    }

    async fn mark_canceled(&self, id: IndexAttemptId, reason: &str) -> Result<()> {
        self.mark_terminal(id, "canceled", Some(reason), None).await
    }

    async fn update_docs_indexed(
        &self,
        id: IndexAttemptId,
        total_docs: i64,
        new_docs: i64,
    ) -> Result<()> {
        self.executor
            .execute(
                "UPDATE index_attempt SET total_docs_indexed = ?, new_docs_indexed = ? WHERE id = ?",
                &[
                    SqlParam::I64(total_docs),
                    SqlParam::I64(new_docs),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn save_checkpoint(&self, id: IndexAttemptId, blob: &str) -> Result<()> {
        self.executor
            .execute(
                "UPDATE index_attempt SET checkpoint_blob = ? WHERE id = ?",
                &[
                    SqlParam::String(blob.to_owned()),
                    SqlParam::I64(id.raw()),
                ],
            )
            .await
    }

    async fn clear_checkpoint(&self, id: IndexAttemptId) -> Result<()> {
        self.executor
            .execute(
                "UPDATE index_attempt SET checkpoint_blob = NULL WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await
    }

    async fn in_progress_attempts(&self) -> Result<Vec<IndexAttempt>> {
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT {COLUMNS} FROM index_attempt \
                     WHERE status IN ('not_started', 'in_progress') ORDER BY id"
                ),
                &[],
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn attempts_with_old_checkpoints(
        &self,
        cutoff_epoch_secs: i64,
    ) -> Result<Vec<IndexAttempt>> {
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT {COLUMNS} FROM index_attempt \
                     WHERE checkpoint_blob IS NOT NULL AND status IN {TERMINAL} \
                       AND COALESCE(completed_at, created_at) < ? ORDER BY id"
                ),
                &[SqlParam::I64(cutoff_epoch_secs)],
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn create_error(
        &self,
        attempt_id: IndexAttemptId,
        cc_pair: CcPairId,
        failure: &ConnectorFailure,
    ) -> Result<()> {
        self.executor
            .execute(
                "INSERT INTO index_attempt_error \
                 (index_attempt_id, cc_pair_id, document_id, entity_id, failure_message, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                &[
                    SqlParam::I64(attempt_id.raw()),
                    SqlParam::I64(cc_pair.raw()),
                    failure
                        .failed_document
                        .as_ref()
                        .map_or(SqlParam::Null, |d| SqlParam::String(d.document_id.clone())),
                    failure
                        .failed_entity
                        .as_ref()
                        .map_or(SqlParam::Null, |e| SqlParam::String(e.entity_id.clone())),
                    SqlParam::String(failure.failure_message.clone()),
                    SqlParam::I64(now()),
                ],
            )
            .await
    }

    async fn unresolved_errors(&self, cc_pair: CcPairId) -> Result<Vec<IndexAttemptError>> {
        let rows = self
            .executor
            .query_all(
                "SELECT id, index_attempt_id, cc_pair_id, document_id, entity_id, \
                        failure_message, is_resolved, created_at \
                 FROM index_attempt_error WHERE cc_pair_id = ? AND is_resolved = 0 ORDER BY id",
                &[SqlParam::I64(cc_pair.raw())],
            )
            .await?;
        rows.iter()
            .map(|r| Self::error_from_row(r.as_ref()))
            .collect()
    }

    async fn resolve_errors(&self, error_ids: &[i64]) -> Result<()> {
        if error_ids.is_empty() {
            return Ok(());
        }
        let placeholders = super::common::placeholders(error_ids.len());
        let params: Vec<SqlParam> = error_ids.iter().copied().map(SqlParam::I64).collect();
        self.executor
            .execute(
                &format!(
                    "UPDATE index_attempt_error SET is_resolved = 1 WHERE id IN ({placeholders})"
                ),
                &params,
            )
            .await
    }
}
