//! Document repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use trawl_domain::entities::{DocumentAccess, DocumentMetadata, DocumentRow, UpdatableChunkData};
use trawl_domain::error::Result;
use trawl_domain::ports::{
    DatabaseExecutor, DocumentLockGuard, DocumentRepository, SqlParam, SqlRow, SqlStatement,
};
use trawl_domain::value_objects::CcPairId;

use super::common::{
    decode_string_list, encode_string_list, now, placeholders, req_bool, req_i64, req_string,
    string_params,
};

const COLUMNS: &str = "id, semantic_identifier, doc_updated_at, last_modified, chunk_count, \
     boost, hidden, needs_sync";

/// SQLite-backed [`DocumentRepository`].
///
/// Per-document modification locks are an in-process sorted lock table
/// (SQLite has no advisory session locks); the indexer and sync workers
/// share this repository instance per tenant, which is what makes the
/// exclusion effective.
pub struct SqliteDocumentRepository {
    executor: Arc<dyn DatabaseExecutor>,
    doc_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SqliteDocumentRepository {
    /// Repository over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self {
            executor,
            doc_locks: Arc::new(DashMap::new()),
        }
    }

    fn from_row(row: &dyn SqlRow) -> Result<DocumentRow> {
        Ok(DocumentRow {
            id: req_string(row, "id")?,
            semantic_identifier: req_string(row, "semantic_identifier")?,
            doc_updated_at: row.try_get_i64("doc_updated_at")?,
            last_modified: req_i64(row, "last_modified")?,
            chunk_count: row.try_get_i64("chunk_count")?,
            boost: req_i64(row, "boost")?,
            hidden: req_bool(row, "hidden")?,
            needs_sync: req_bool(row, "needs_sync")?,
        })
    }
}

struct HeldDocumentLocks {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl DocumentLockGuard for HeldDocumentLocks {}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<DocumentRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT {COLUMNS} FROM document WHERE id IN ({})",
                    placeholders(ids.len())
                ),
                &string_params(ids),
            )
            .await?;
        rows.iter().map(|r| Self::from_row(r.as_ref())).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRow>> {
        let row = self
            .executor
            .query_one(
                &format!("SELECT {COLUMNS} FROM document WHERE id = ?"),
                &[SqlParam::String(id.to_owned())],
            )
            .await?;
        row.map(|r| Self::from_row(r.as_ref())).transpose()
    }

    async fn upsert_metadata(&self, docs: &[DocumentMetadata]) -> Result<()> {
        let ts = now();
        for doc in docs {
            // never touches doc_updated_at: that column only advances after
            // a successful index write
            self.executor
                .execute(
                    "INSERT INTO document \
                     (id, semantic_identifier, first_link, source, from_ingestion_api, \
                      primary_owners, secondary_owners, last_modified) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(id) DO UPDATE SET \
                        semantic_identifier = excluded.semantic_identifier, \
                        first_link = excluded.first_link, \
                        primary_owners = excluded.primary_owners, \
                        secondary_owners = excluded.secondary_owners",
                    &[
                        SqlParam::String(doc.document_id.clone()),
                        SqlParam::String(doc.semantic_identifier.clone()),
                        doc.first_link
                            .as_ref()
                            .map_or(SqlParam::Null, |l| SqlParam::String(l.clone())),
                        SqlParam::String(doc.source.to_string()),
                        SqlParam::Bool(doc.from_ingestion_api),
                        SqlParam::String(encode_string_list(&doc.primary_owners)),
                        SqlParam::String(encode_string_list(&doc.secondary_owners)),
                        SqlParam::I64(ts),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn upsert_ccpair_relationship(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()> {
        for id in ids {
            self.executor
                .execute(
                    "INSERT OR IGNORE INTO document_by_cc_pair (cc_pair_id, document_id) \
                     VALUES (?, ?)",
                    &[SqlParam::I64(cc_pair.raw()), SqlParam::String(id.clone())],
                )
                .await?;
        }
        Ok(())
    }

    async fn prepare_to_modify(&self, ids: &[String]) -> Result<Box<dyn DocumentLockGuard>> {
        // sorted acquisition precludes deadlocks against sync workers
        let mut sorted: Vec<String> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            let mutex = self
                .doc_locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value()
                .clone();
            guards.push(mutex.lock_owned().await);
        }
        Ok(Box::new(HeldDocumentLocks { _guards: guards }))
    }

    async fn mark_indexed_for_ccpair(&self, cc_pair: CcPairId, ids: &[String]) -> Result<()> {
        for id in ids {
            self.executor
                .execute(
                    "UPDATE document_by_cc_pair SET has_been_indexed = 1 \
                     WHERE cc_pair_id = ? AND document_id = ?",
                    &[SqlParam::I64(cc_pair.raw()), SqlParam::String(id.clone())],
                )
                .await?;
        }
        Ok(())
    }

    async fn finalize_indexed_batch(
        &self,
        cc_pair: CcPairId,
        ids_to_new_updated_at: &BTreeMap<String, i64>,
        last_modified_ids: &[String],
        chunk_counts: &BTreeMap<String, i64>,
        chunk_boosts: &[UpdatableChunkData],
        all_batch_ids: &[String],
    ) -> Result<()> {
        let ts = now();
        let mut statements = Vec::new();

        for (id, updated_at) in ids_to_new_updated_at {
            statements.push(SqlStatement::new(
                "UPDATE document SET doc_updated_at = ? WHERE id = ?",
                vec![SqlParam::I64(*updated_at), SqlParam::String(id.clone())],
            ));
        }
        // the last_modified bump flags needs_sync, which is what enqueues
        // the doc for metadata re-sync on the next coordinator pass
        for id in last_modified_ids {
            statements.push(SqlStatement::new(
                "UPDATE document SET last_modified = ?, needs_sync = 1 WHERE id = ?",
                vec![SqlParam::I64(ts), SqlParam::String(id.clone())],
            ));
        }
        for (id, count) in chunk_counts {
            statements.push(SqlStatement::new(
                "UPDATE document SET chunk_count = ? WHERE id = ?",
                vec![SqlParam::I64(*count), SqlParam::String(id.clone())],
            ));
        }
        for boost in chunk_boosts {
            statements.push(SqlStatement::new(
                "INSERT INTO chunk_boost (document_id, chunk_id, boost_score) VALUES (?, ?, ?) \
                 ON CONFLICT(document_id, chunk_id) DO UPDATE SET boost_score = excluded.boost_score",
                vec![
                    SqlParam::String(boost.document_id.clone()),
                    SqlParam::I64(boost.chunk_id),
                    SqlParam::F64(f64::from(boost.boost_score)),
                ],
            ));
        }
        for id in all_batch_ids {
            statements.push(SqlStatement::new(
                "UPDATE document_by_cc_pair SET has_been_indexed = 1 \
                 WHERE cc_pair_id = ? AND document_id = ?",
                vec![SqlParam::I64(cc_pair.raw()), SqlParam::String(id.clone())],
            ));
        }

        self.executor.execute_transaction(&statements).await
    }

    async fn chunk_counts(&self, ids: &[String]) -> Result<BTreeMap<String, i64>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = self
            .executor
            .query_all(
                &format!(
                    "SELECT id, chunk_count FROM document \
                     WHERE id IN ({}) AND chunk_count IS NOT NULL",
                    placeholders(ids.len())
                ),
                &string_params(ids),
            )
            .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let id = req_string(row.as_ref(), "id")?;
            if let Some(count) = row.try_get_i64("chunk_count")? {
                out.insert(id, count);
            }
        }
        Ok(out)
    }

    async fn count_needs_sync(&self) -> Result<u64> {
        let row = self
            .executor
            .query_one(
                "SELECT COUNT(*) AS count FROM document WHERE needs_sync = 1",
                &[],
            )
            .await?;
        Ok(row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0)
            .max(0) as u64)
    }

    async fn stale_document_ids(&self, cc_pair: CcPairId, limit: usize) -> Result<Vec<String>> {
        let rows = self
            .executor
            .query_all(
                "SELECT d.id AS id FROM document d \
                 JOIN document_by_cc_pair dbc ON dbc.document_id = d.id \
                 WHERE dbc.cc_pair_id = ? AND d.needs_sync = 1 \
                 ORDER BY d.last_modified, d.id LIMIT ?",
                &[SqlParam::I64(cc_pair.raw()), SqlParam::I64(limit as i64)],
            )
            .await?;
        rows.iter().map(|r| req_string(r.as_ref(), "id")).collect()
    }

    async fn mark_synced(&self, id: &str) -> Result<()> {
        self.executor
            .execute(
                "UPDATE document SET needs_sync = 0 WHERE id = ?",
                &[SqlParam::String(id.to_owned())],
            )
            .await
    }

    async fn access_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, DocumentAccess>> {
        let mut out = BTreeMap::new();
        for id in ids {
            out.insert(id.clone(), self.access_for_document(id).await?);
        }
        Ok(out)
    }

    async fn access_for_document(&self, id: &str) -> Result<DocumentAccess> {
        let mut access = DocumentAccess::no_access();

        let public_row = self
            .executor
            .query_one(
                "SELECT COUNT(*) AS count FROM document_by_cc_pair dbc \
                 JOIN connector_credential_pair ccp ON ccp.id = dbc.cc_pair_id \
                 WHERE dbc.document_id = ? AND ccp.access_type = 'public'",
                &[SqlParam::String(id.to_owned())],
            )
            .await?;
        access.is_public = public_row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0)
            > 0;

        let group_rows = self
            .executor
            .query_all(
                "SELECT g.name AS name FROM user_group__document ugd \
                 JOIN user_group g ON g.id = ugd.user_group_id \
                 WHERE ugd.document_id = ?",
                &[SqlParam::String(id.to_owned())],
            )
            .await?;
        for row in group_rows {
            access.user_groups.insert(req_string(row.as_ref(), "name")?);
        }

        let owners_row = self
            .executor
            .query_one(
                "SELECT primary_owners FROM document WHERE id = ?",
                &[SqlParam::String(id.to_owned())],
            )
            .await?;
        if let Some(raw) = owners_row.and_then(|r| r.try_get_string("primary_owners").ok().flatten())
        {
            for owner in decode_string_list(&raw) {
                access.user_emails.insert(owner);
            }
        }
        Ok(access)
    }

    async fn document_sets_for_documents(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, std::collections::BTreeSet<String>>> {
        let mut out: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
        for id in ids {
            out.insert(id.clone(), self.document_sets_for_document(id).await?);
        }
        Ok(out)
    }

    async fn document_sets_for_document(
        &self,
        id: &str,
    ) -> Result<std::collections::BTreeSet<String>> {
        let rows = self
            .executor
            .query_all(
                "SELECT ds.name AS name FROM document_set__document dsd \
                 JOIN document_set ds ON ds.id = dsd.document_set_id \
                 WHERE dsd.document_id = ?",
                &[SqlParam::String(id.to_owned())],
            )
            .await?;
        let mut out = std::collections::BTreeSet::new();
        for row in rows {
            out.insert(req_string(row.as_ref(), "name")?);
        }
        Ok(out)
    }
}
