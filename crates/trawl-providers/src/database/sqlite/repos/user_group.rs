//! User-group repository.

use std::sync::Arc;

use async_trait::async_trait;
use trawl_domain::entities::UserGroup;
use trawl_domain::error::Result;
use trawl_domain::ports::{DatabaseExecutor, SqlParam, SqlRow, UserGroupRepository};
use trawl_domain::value_objects::UserGroupId;

use super::common::{req_bool, req_i64, req_string};

/// SQLite-backed [`UserGroupRepository`].
pub struct SqliteUserGroupRepository {
    executor: Arc<dyn DatabaseExecutor>,
}

impl SqliteUserGroupRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self { executor }
    }

    fn from_row(row: &dyn SqlRow) -> Result<UserGroup> {
        Ok(UserGroup {
            id: UserGroupId::new(req_i64(row, "id")?),
            name: req_string(row, "name")?,
            is_up_to_date: req_bool(row, "is_up_to_date")?,
        })
    }
}

#[async_trait]
impl UserGroupRepository for SqliteUserGroupRepository {
    async fn get(&self, id: UserGroupId) -> Result<Option<UserGroup>> {
        let row = self
            .executor
            .query_one(
                "SELECT id, name, is_up_to_date FROM user_group WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn list(&self, include_up_to_date: bool) -> Result<Vec<UserGroup>> {
        let sql = if include_up_to_date {
            "SELECT id, name, is_up_to_date FROM user_group ORDER BY id"
        } else {
            "SELECT id, name, is_up_to_date FROM user_group WHERE is_up_to_date = 0 ORDER BY id"
        };
        let rows = self.executor.query_all(sql, &[]).await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn document_ids(&self, id: UserGroupId) -> Result<Vec<String>> {
        let rows = self
            .executor
            .query_all(
                "SELECT document_id FROM user_group__document WHERE user_group_id = ? \
                 ORDER BY document_id",
                &[SqlParam::I64(id.raw())],
            )
            .await?;
        rows.iter()
            .map(|r| req_string(r.as_ref(), "document_id"))
            .collect()
    }

    async fn mark_synced(&self, id: UserGroupId) -> Result<()> {
        self.executor
            .execute(
                "UPDATE user_group SET is_up_to_date = 1 WHERE id = ?",
                &[SqlParam::I64(id.raw())],
            )
            .await
    }
}
