//! Document-set repository.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::DocumentSet;
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{DatabaseExecutor, DocumentSetRepository, SqlParam, SqlRow};
use trawl_domain::value_objects::DocumentSetId;

use super::common::{req_bool, req_i64, req_string};

/// SQLite-backed [`DocumentSetRepository`].
pub struct SqliteDocumentSetRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteDocumentSetRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<DocumentSet> {
        Ok(DocumentSet {
            id: DocumentSetId::new(req_i64(row, "id")?),
            name: req_string(row, "name")?,
            is_up_to_date: req_bool(row, "is_up_to_date")?,
        })
    }
}

#[async_trait]
impl DocumentSetRepository for SqliteDocumentSetRepository {
    async fn create(&self, name: &str) -> Result<DocumentSetId> {
        let row = self
            .executor
            .query_one(
                "INSERT INTO document_set (name, is_up_to_date) VALUES (?, 0) RETURNING id",
                &[SqlParam::String(name.to_owned())],
            )
            .await?
            .ok_or_else(|| Error::database("insert returned no id"))?;
        Ok(DocumentSetId::new(req_i64(row.as_ref(), "id")?))
    }

    async fn get(&self, id: DocumentSetId) -> Result<Option<DocumentSet>> {
        let row = self
            .executor
            .query_one(
                "SELECT id, name, is_up_to_date FROM document_set WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn list(&self, include_up_to_date: bool) -> Result<Vec<DocumentSet>> {
        let sql = if include_up_to_date {
            "SELECT id, name, is_up_to_date FROM document_set ORDER BY id"
        } else {
            "SELECT id, name, is_up_to_date FROM document_set WHERE is_up_to_date = 0 ORDER BY id"
        };
        let rows = self.executor.query_all(sql, &[]).await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn add_document(&self, id: DocumentSetId, document_id: &str) -> Result<()> {
        self.executor
            .execute(
                "INSERT OR IGNORE INTO document_set__document (document_set_id, document_id) \
                 VALUES (?, ?)",
                &[
                    SqlParam::I64(id.raw()),
                    SqlParam::String(document_id.to_owned()),
                ],
            )
            .await?;
        self.executor
            .execute(
                "UPDATE document_set SET is_up_to_date = 0 WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await
    }

    async fn document_ids(&self, id: DocumentSetId) -> Result<Vec<String>> {
        let rows = self
            .executor
            .query_all(
                "SELECT document_id FROM document_set__document WHERE document_set_id = ? \
                 ORDER BY document_id",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        rows.iter()
            .map(|r| req_string(r.as_ref(), "document_id"))
            .collect()
    }

    async fn has_ccpair_associations(&self, id: DocumentSetId) -> Result<bool> {
        let row = self
            .executor
            .query_one(
                "SELECT COUNT(*) AS count FROM document_set__ccpair WHERE document_set_id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        Ok(row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0)
            > 0)
    }

    async fn mark_synced(&self, id: DocumentSetId) -> Result<()> {
        self.executor
            .execute(
                "UPDATE document_set SET is_up_to_date = 1 WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await
    }

    async fn delete(&self, id: DocumentSetId) -> Result<()> {
        self.executor
            .execute(
                "DELETE FROM document_set__document WHERE document_set_id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        self.executor
            .execute(
                "DELETE FROM document_set__ccpair WHERE document_set_id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        self.executor
            .execute(
                "DELETE FROM document_set WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await
    }
}
