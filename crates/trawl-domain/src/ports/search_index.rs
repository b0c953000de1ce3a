//! Search index port.
//!
//! The external document index: idempotent chunk upserts keyed by
//! `(doc_id, chunk_id)`, single-document metadata updates, and deletes.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::entities::{ConnectorFailure, DocMetadataAwareIndexChunk, DocumentAccess, SearchSettings};
use crate::error::Result;
use crate::value_objects::TenantId;

/// Batch parameters for an index write.
///
/// The previous/new chunk counts let the index delete trailing chunks of
/// shrunken documents, keeping each document minimal.
#[derive(Debug, Clone)]
pub struct IndexBatchParams {
    /// Chunk count currently in the index per document (`None` = unknown)
    pub doc_id_to_previous_chunk_cnt: BTreeMap<String, Option<i64>>,
    /// Chunk count being written per document
    pub doc_id_to_new_chunk_cnt: BTreeMap<String, i64>,
    /// Tenant that owns the batch
    pub tenant_id: TenantId,
    /// Whether large-chunk multipass entries accompany the batch
    pub large_chunks_enabled: bool,
}

/// Outcome for one document in an index write.
#[derive(Debug, Clone)]
pub struct InsertionRecord {
    /// The document id
    pub document_id: String,
    /// Whether any chunk of the document already existed in the index
    pub already_existed: bool,
}

/// Result of one batch write: per-document records plus failures.
#[derive(Debug, Clone, Default)]
pub struct IndexBatchResponse {
    /// Successfully written documents
    pub records: Vec<InsertionRecord>,
    /// Documents that could not be written
    pub failures: Vec<ConnectorFailure>,
}

/// Document-level fields updated by sync workers.
///
/// `None` fields are left untouched by the index.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndexFields {
    /// ACL payload
    pub access: Option<DocumentAccess>,
    /// Document-set membership
    pub document_sets: Option<BTreeSet<String>>,
    /// Ranking boost
    pub boost: Option<i64>,
    /// Hidden flag
    pub hidden: Option<bool>,
}

/// The search index API consumed by the pipeline and sync workers.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Ensure the index/schema for a settings generation exists.
    async fn ensure_ready(&self, settings: &SearchSettings) -> Result<()>;

    /// Upsert a batch of chunks, then delete trailing chunks of documents
    /// that shrank. Idempotent by `(doc_id, chunk_id)`.
    async fn index(
        &self,
        index_name: &str,
        chunks: &[DocMetadataAwareIndexChunk],
        params: &IndexBatchParams,
    ) -> Result<IndexBatchResponse>;

    /// Update document-level fields on every chunk of one document.
    /// Returns the number of chunks affected; zero when the document is
    /// not in the index (which is fine).
    async fn update_single(
        &self,
        index_name: &str,
        document_id: &str,
        tenant_id: &TenantId,
        chunk_count: Option<i64>,
        fields: &DocumentIndexFields,
    ) -> Result<u64>;

    /// Delete every chunk of one document. Returns chunks removed.
    async fn delete(&self, index_name: &str, document_id: &str, tenant_id: &TenantId)
    -> Result<u64>;
}
