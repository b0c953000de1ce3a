//! In-memory search index.
//!
//! Deterministic single-process index used by tests and development. It
//! implements the same write discipline as the real index: chunk upserts
//! keyed by `(doc_id, chunk_id)` followed by deletion of trailing chunks
//! of shrunken documents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use trawl_domain::entities::{DocMetadataAwareIndexChunk, DocumentAccess, SearchSettings};
use trawl_domain::error::Result;
use trawl_domain::ports::{
    DocumentIndexFields, IndexBatchParams, IndexBatchResponse, InsertionRecord, SearchIndexProvider,
};
use trawl_domain::value_objects::TenantId;

/// One stored chunk.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Chunk content
    pub content: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Boost factor recorded at write time
    pub boost_factor: f32,
}

#[derive(Debug, Clone, Default)]
struct StoredDocument {
    chunks: BTreeMap<i64, StoredChunk>,
    access: DocumentAccess,
    document_sets: BTreeSet<String>,
    boost: i64,
    hidden: bool,
}

fn doc_key(tenant: &TenantId, document_id: &str) -> String {
    format!("{tenant}/{document_id}")
}

/// In-memory [`SearchIndexProvider`].
#[derive(Default)]
pub struct MemorySearchIndex {
    indexes: DashMap<String, DashMap<String, StoredDocument>>,
    write_counts: DashMap<String, u64>,
}

impl MemorySearchIndex {
    /// Fresh empty index store.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Chunk ids currently stored for a document (test observability).
    #[must_use]
    pub fn chunk_ids(&self, index_name: &str, tenant: &TenantId, document_id: &str) -> Vec<i64> {
        self.indexes
            .get(index_name)
            .and_then(|index| {
                index
                    .get(&doc_key(tenant, document_id))
                    .map(|doc| doc.chunks.keys().copied().collect())
            })
            .unwrap_or_default()
    }

    /// Document-set names currently attached to a document.
    #[must_use]
    pub fn document_sets(
        &self,
        index_name: &str,
        tenant: &TenantId,
        document_id: &str,
    ) -> BTreeSet<String> {
        self.indexes
            .get(index_name)
            .and_then(|index| {
                index
                    .get(&doc_key(tenant, document_id))
                    .map(|doc| doc.document_sets.clone())
            })
            .unwrap_or_default()
    }

    /// Number of chunk upserts ever issued for a document.
    #[must_use]
    pub fn write_count(&self, document_id: &str) -> u64 {
        self.write_counts
            .get(document_id)
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SearchIndexProvider for MemorySearchIndex {
    async fn ensure_ready(&self, settings: &SearchSettings) -> Result<()> {
        self.indexes.entry(settings.index_name.clone()).or_default();
        Ok(())
    }

    async fn index(
        &self,
        index_name: &str,
        chunks: &[DocMetadataAwareIndexChunk],
        params: &IndexBatchParams,
    ) -> Result<IndexBatchResponse> {
        let index = self.indexes.entry(index_name.to_owned()).or_default();
        let mut response = IndexBatchResponse::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for chunk in chunks {
            let document_id = &chunk.chunk.source_document_id;
            let key = doc_key(&params.tenant_id, document_id);
            let mut doc = index.entry(key).or_default();
            if touched.insert(document_id.clone()) {
                response.records.push(InsertionRecord {
                    document_id: document_id.clone(),
                    already_existed: !doc.chunks.is_empty(),
                });
            }
            doc.access = chunk.access.clone();
            doc.document_sets = chunk.document_sets.clone();
            doc.boost = chunk.boost;
            doc.chunks.insert(
                chunk.chunk.chunk_id,
                StoredChunk {
                    content: chunk.chunk.content.clone(),
                    embedding: chunk.embeddings.full_embedding.clone(),
                    boost_factor: chunk.aggregated_chunk_boost_factor,
                },
            );
            *self.write_counts.entry(document_id.clone()).or_insert(0) += 1;
        }

        // documents with zero new chunks still get accounted for
        for (document_id, new_count) in &params.doc_id_to_new_chunk_cnt {
            if *new_count == 0 && touched.insert(document_id.clone()) {
                let key = doc_key(&params.tenant_id, document_id);
                response.records.push(InsertionRecord {
                    document_id: document_id.clone(),
                    already_existed: index
                        .get(&key)
                        .is_some_and(|doc| !doc.chunks.is_empty()),
                });
            }
        }

        // trailing chunks of shrunken documents get deleted
        for (document_id, new_count) in &params.doc_id_to_new_chunk_cnt {
            let previous = params
                .doc_id_to_previous_chunk_cnt
                .get(document_id)
                .copied()
                .flatten()
                .unwrap_or(0);
            if previous > *new_count {
                let key = doc_key(&params.tenant_id, document_id);
                if let Some(mut doc) = index.get_mut(&key) {
                    for stale_id in *new_count..previous {
                        doc.chunks.remove(&stale_id);
                    }
                }
            }
        }

        Ok(response)
    }

    async fn update_single(
        &self,
        index_name: &str,
        document_id: &str,
        tenant_id: &TenantId,
        _chunk_count: Option<i64>,
        fields: &DocumentIndexFields,
    ) -> Result<u64> {
        let Some(index) = self.indexes.get(index_name) else {
            return Ok(0);
        };
        let Some(mut doc) = index.get_mut(&doc_key(tenant_id, document_id)) else {
            // doc not in this index generation; fine
            return Ok(0);
        };
        if let Some(access) = &fields.access {
            doc.access = access.clone();
        }
        if let Some(sets) = &fields.document_sets {
            doc.document_sets = sets.clone();
        }
        if let Some(boost) = fields.boost {
            doc.boost = boost;
        }
        if let Some(hidden) = fields.hidden {
            doc.hidden = hidden;
        }
        Ok(doc.chunks.len() as u64)
    }

    async fn delete(
        &self,
        index_name: &str,
        document_id: &str,
        tenant_id: &TenantId,
    ) -> Result<u64> {
        let Some(index) = self.indexes.get(index_name) else {
            return Ok(0);
        };
        Ok(index
            .remove(&doc_key(tenant_id, document_id))
            .map(|(_, doc)| doc.chunks.len() as u64)
            .unwrap_or(0))
    }
}
