//! The indexing pipeline.
//!
//! # Overview
//! Takes one batch of connector documents through:
//! filter → prepare (relational upserts + freshness skip) → image
//! processing → chunking → optional contextual summaries → embedding →
//! content classification → per-document locks → index write → one
//! finalizing transaction.
//!
//! # Failure isolation
//! Embedding and index-write failures are recorded per document and do not
//! halt the batch; a batch-level error converts into one failure per
//! document via [`IndexingPipeline::index_batch_guarded`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use trawl_domain::constants::indexing as limits;
use trawl_domain::entities::{
    ConnectorFailure, DocMetadataAwareIndexChunk, Document, DocumentMetadata, DocumentRow,
    SearchSettings,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    ConnectorFactory, ContentClassifier, EmbeddingProvider, IndexBatchParams, IndexingHeartbeat,
    ProcessSpawner, Repositories, SearchIndexProvider, TaskQueue, TextGenerator, VisionProvider,
};
use trawl_domain::value_objects::TenantId;

use super::chunker::Chunker;
use super::classify::aggregated_chunk_boost_factors;
use super::contextual::add_contextual_summaries;
use super::embedder::embed_chunks_with_failure_handling;
use crate::runtime::process_image_sections;

/// Shared provider bundle the indexing use cases run against.
///
/// Built once per process by the worker wiring; tenant-independent.
#[derive(Clone)]
pub struct IndexingServices {
    /// The search index
    pub search_index: Arc<dyn SearchIndexProvider>,
    /// Embeddings
    pub embedding: Arc<dyn EmbeddingProvider>,
    /// Content classification, when deployed
    pub classifier: Option<Arc<dyn ContentClassifier>>,
    /// Vision summarization, when deployed
    pub vision: Option<Arc<dyn VisionProvider>>,
    /// Text generation for contextual RAG, when deployed
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Connector construction
    pub connector_factory: Arc<dyn ConnectorFactory>,
    /// Task dispatch
    pub queue: Arc<dyn TaskQueue>,
    /// Child-process spawning for watchdogs
    pub spawner: Arc<dyn ProcessSpawner>,
}

/// Attempt-scoped metadata threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct IndexAttemptMetadata {
    /// The pair being indexed
    pub cc_pair_id: trawl_domain::value_objects::CcPairId,
    /// The attempt row
    pub index_attempt_id: trawl_domain::value_objects::IndexAttemptId,
    /// 1-based batch number within the attempt
    pub batch_num: usize,
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Default)]
pub struct IndexingPipelineResult {
    /// Documents that were completely new to the system
    pub new_docs: usize,
    /// Documents the batch covered (including freshness-skipped ones)
    pub total_docs: usize,
    /// Chunks written to the index
    pub total_chunks: usize,
    /// Per-document failures
    pub failures: Vec<ConnectorFailure>,
}

struct PrepareContext {
    updatable_docs: Vec<Document>,
    db_rows: BTreeMap<String, DocumentRow>,
}

/// Batched, single-process indexing pipeline.
pub struct IndexingPipeline {
    repos: Repositories,
    search_index: Arc<dyn SearchIndexProvider>,
    embedding: Arc<dyn EmbeddingProvider>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    vision: Option<Arc<dyn VisionProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    settings: SearchSettings,
    tenant: TenantId,
    chunker: Chunker,
    ignore_time_skip: bool,
    heartbeat: Arc<dyn IndexingHeartbeat>,
}

impl IndexingPipeline {
    /// Build a pipeline for one attempt.
    pub fn new(
        repos: Repositories,
        services: &IndexingServices,
        settings: SearchSettings,
        tenant: TenantId,
        ignore_time_skip: bool,
        heartbeat: Arc<dyn IndexingHeartbeat>,
    ) -> Self {
        let chunker = Chunker::from_settings(&settings);
        Self {
            repos,
            search_index: Arc::clone(&services.search_index),
            embedding: Arc::clone(&services.embedding),
            classifier: services.classifier.clone(),
            vision: services.vision.clone(),
            generator: services.generator.clone(),
            settings,
            tenant,
            chunker,
            ignore_time_skip,
            heartbeat,
        }
    }

    /// Run one batch, converting a batch-level error into one failure per
    /// document so the attempt can continue.
    pub async fn index_batch_guarded(
        &self,
        batch: Vec<Document>,
        metadata: &IndexAttemptMetadata,
    ) -> IndexingPipelineResult {
        let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();
        let links: Vec<Option<String>> = batch
            .iter()
            .map(|d| d.sections.first().and_then(|s| s.link().map(str::to_owned)))
            .collect();
        match self.index_batch(batch, metadata).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    attempt = %metadata.index_attempt_id,
                    batch = metadata.batch_num,
                    error = %e,
                    "Failed to index document batch"
                );
                IndexingPipelineResult {
                    new_docs: 0,
                    total_docs: ids.len(),
                    total_chunks: 0,
                    failures: ids
                        .into_iter()
                        .zip(links)
                        .map(|(id, link)| {
                            ConnectorFailure::for_document(id, link, e.to_string())
                        })
                        .collect(),
                }
            }
        }
    }

    async fn index_batch(
        &self,
        batch: Vec<Document>,
        metadata: &IndexAttemptMetadata,
    ) -> Result<IndexingPipelineResult> {
        // 1. filter
        let filtered = filter_documents(batch);
        let filtered_ids: Vec<String> = filtered.iter().map(|d| d.id.clone()).collect();

        // 2. prepare
        let Some(ctx) = self.prepare(&filtered, metadata).await? else {
            // everything was already up to date; still count the docs for
            // the pair so attempt and pair counts stay in parity
            self.repos
                .documents
                .mark_indexed_for_ccpair(metadata.cc_pair_id, &filtered_ids)
                .await?;
            return Ok(IndexingPipelineResult {
                new_docs: 0,
                total_docs: filtered.len(),
                total_chunks: 0,
                failures: Vec::new(),
            });
        };

        // 3. image processing
        let indexable =
            process_image_sections(ctx.updatable_docs.clone(), self.vision.as_deref()).await;

        // 4. chunk
        let mut chunks = self.chunker.chunk(&indexable, self.heartbeat.as_ref());

        // 5. contextual RAG
        if self.settings.enable_contextual_rag
            && let Some(generator) = self.generator.as_deref()
        {
            let doc_texts: BTreeMap<String, String> = indexable
                .iter()
                .map(|d| (d.document.id.clone(), d.text_content()))
                .collect();
            add_contextual_summaries(&mut chunks, &doc_texts, generator, true, true).await;
        }

        // 6. embed, isolating per-document failures
        let (embedded, embedding_failures) = if chunks.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            embed_chunks_with_failure_handling(
                chunks,
                self.embedding.as_ref(),
                self.heartbeat.as_ref(),
            )
            .await
        };

        // 7. classify
        let plain_chunks: Vec<_> = embedded.iter().map(|(c, _)| c.clone()).collect();
        let boost_factors =
            aggregated_chunk_boost_factors(&plain_chunks, self.classifier.as_deref()).await;

        let updatable_ids: Vec<String> =
            ctx.updatable_docs.iter().map(|d| d.id.clone()).collect();

        // 8. per-document locks for the index-write + finalize window
        let _lock_guard = self.repos.documents.prepare_to_modify(&updatable_ids).await?;

        let access_map = self
            .repos
            .documents
            .access_for_documents(&updatable_ids)
            .await?;
        let docset_map = self
            .repos
            .documents
            .document_sets_for_documents(&updatable_ids)
            .await?;
        let previous_chunk_counts = self.repos.documents.chunk_counts(&updatable_ids).await?;

        let mut new_chunk_counts: BTreeMap<String, i64> = updatable_ids
            .iter()
            .map(|id| (id.clone(), 0i64))
            .collect();
        for (chunk, _) in &embedded {
            if let Some(count) = new_chunk_counts.get_mut(&chunk.source_document_id) {
                *count += 1;
            }
        }

        let access_aware_chunks: Vec<DocMetadataAwareIndexChunk> = embedded
            .into_iter()
            .zip(boost_factors.iter().copied())
            .map(|((chunk, embeddings), boost_factor)| {
                let doc_id = chunk.source_document_id.clone();
                DocMetadataAwareIndexChunk {
                    access: access_map.get(&doc_id).cloned().unwrap_or_default(),
                    document_sets: docset_map.get(&doc_id).cloned().unwrap_or_default(),
                    boost: ctx.db_rows.get(&doc_id).map_or(0, |row| row.boost),
                    aggregated_chunk_boost_factor: boost_factor,
                    tenant_id: self.tenant.clone(),
                    chunk,
                    embeddings,
                }
            })
            .collect();

        let chunk_boosts: Vec<_> = access_aware_chunks
            .iter()
            .map(|c| trawl_domain::entities::UpdatableChunkData {
                document_id: c.chunk.source_document_id.clone(),
                chunk_id: c.chunk.chunk_id,
                boost_score: c.aggregated_chunk_boost_factor,
            })
            .collect();

        // 9. write to the index
        let params = IndexBatchParams {
            doc_id_to_previous_chunk_cnt: updatable_ids
                .iter()
                .map(|id| (id.clone(), previous_chunk_counts.get(id).copied()))
                .collect(),
            doc_id_to_new_chunk_cnt: new_chunk_counts.clone(),
            tenant_id: self.tenant.clone(),
            large_chunks_enabled: self.settings.multipass_indexing,
        };
        let write_response = self
            .search_index
            .index(&self.settings.index_name, &access_aware_chunks, &params)
            .await?;

        // every updatable doc must be accounted for: written or failed
        let mut returned: BTreeSet<String> = write_response
            .records
            .iter()
            .map(|r| r.document_id.clone())
            .collect();
        for failure in write_response
            .failures
            .iter()
            .chain(embedding_failures.iter())
        {
            if let Some(doc) = &failure.failed_document {
                returned.insert(doc.document_id.clone());
            }
        }
        let expected: BTreeSet<String> = updatable_ids.iter().cloned().collect();
        if returned != expected {
            return Err(Error::internal(format!(
                "some documents were not accounted for by the index write: expected {expected:?}, got {returned:?}"
            )));
        }

        // 10-11. one transaction: advance doc_updated_at, bump
        // last_modified (which enqueues the doc for metadata re-sync),
        // persist chunk counts + boosts, mark docs indexed for the pair
        let failed_ids: BTreeSet<String> = write_response
            .failures
            .iter()
            .chain(embedding_failures.iter())
            .filter_map(|f| f.failed_document.as_ref().map(|d| d.document_id.clone()))
            .collect();

        let succeeded_docs: Vec<&Document> = ctx
            .updatable_docs
            .iter()
            .filter(|d| !failed_ids.contains(&d.id))
            .collect();

        let mut ids_to_new_updated_at = BTreeMap::new();
        let mut last_modified_ids = Vec::new();
        for doc in &succeeded_docs {
            last_modified_ids.push(doc.id.clone());
            if let Some(updated_at) = doc.doc_updated_at {
                ids_to_new_updated_at.insert(doc.id.clone(), updated_at);
            }
        }
        let succeeded_chunk_counts: BTreeMap<String, i64> = new_chunk_counts
            .iter()
            .filter(|(id, _)| !failed_ids.contains(*id))
            .map(|(id, n)| (id.clone(), *n))
            .collect();

        self.repos
            .documents
            .finalize_indexed_batch(
                metadata.cc_pair_id,
                &ids_to_new_updated_at,
                &last_modified_ids,
                &succeeded_chunk_counts,
                &chunk_boosts,
                &filtered_ids,
            )
            .await?;

        let new_docs = write_response
            .records
            .iter()
            .filter(|r| !r.already_existed && !failed_ids.contains(&r.document_id))
            .count();
        let mut failures = embedding_failures;
        failures.extend(write_response.failures);

        Ok(IndexingPipelineResult {
            new_docs,
            total_docs: filtered_ids.len(),
            total_chunks: access_aware_chunks.len(),
            failures,
        })
    }

    async fn prepare(
        &self,
        documents: &[Document],
        metadata: &IndexAttemptMetadata,
    ) -> Result<Option<PrepareContext>> {
        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let db_docs = self.repos.documents.get_by_ids(&ids).await?;
        let db_rows: BTreeMap<String, DocumentRow> =
            db_docs.into_iter().map(|row| (row.id.clone(), row)).collect();

        let updatable_docs: Vec<Document> = if self.ignore_time_skip {
            documents.to_vec()
        } else {
            documents
                .iter()
                .filter(|doc| {
                    match (doc.doc_updated_at, db_rows.get(&doc.id).and_then(|r| r.doc_updated_at)) {
                        (Some(incoming), Some(stored)) => incoming > stored,
                        _ => true,
                    }
                })
                .cloned()
                .collect()
        };

        if updatable_docs.len() != documents.len() {
            let skipped: Vec<&str> = documents
                .iter()
                .filter(|d| !updatable_docs.iter().any(|u| u.id == d.id))
                .map(|d| d.id.as_str())
                .collect();
            tracing::info!(
                skipped = skipped.len(),
                ids = ?skipped,
                "Skipping documents that are already up to date"
            );
        }

        if !updatable_docs.is_empty() {
            let metadata_rows: Vec<DocumentMetadata> = updatable_docs
                .iter()
                .map(|doc| DocumentMetadata {
                    cc_pair_id: metadata.cc_pair_id,
                    document_id: doc.id.clone(),
                    semantic_identifier: doc.semantic_identifier.clone(),
                    first_link: doc
                        .sections
                        .iter()
                        .find_map(|s| s.link().map(str::to_owned)),
                    primary_owners: doc.primary_owners.clone().unwrap_or_default(),
                    secondary_owners: doc.secondary_owners.clone().unwrap_or_default(),
                    from_ingestion_api: doc.from_ingestion_api,
                    source: doc.source,
                })
                .collect();
            self.repos.documents.upsert_metadata(&metadata_rows).await?;
        }

        self.repos
            .documents
            .upsert_ccpair_relationship(metadata.cc_pair_id, &ids)
            .await?;

        if updatable_docs.is_empty() {
            return Ok(None);
        }
        Ok(Some(PrepareContext {
            updatable_docs,
            db_rows,
        }))
    }
}

/// Drop empty and oversized documents.
fn filter_documents(batch: Vec<Document>) -> Vec<Document> {
    let mut kept = Vec::with_capacity(batch.len());
    for document in batch {
        if document.is_empty() {
            tracing::warn!(
                doc = %document.id,
                "Skipping document with neither title nor content"
            );
            continue;
        }
        let size = document.total_char_length();
        if size > limits::MAX_DOCUMENT_CHARS {
            tracing::warn!(doc = %document.id, size, "Skipping document: too long");
            continue;
        }
        if size > limits::DOCUMENT_SIZE_WARNING_CHARS {
            tracing::warn!(
                doc = %document.short_descriptor(),
                size,
                threshold = limits::DOCUMENT_SIZE_WARNING_CHARS,
                "Document size over warning threshold"
            );
        }
        kept.push(document);
    }
    kept
}
