//! Chunk types produced by the indexing pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::DocumentAccess;
use crate::value_objects::TenantId;

/// Embeddings for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbeddings {
    /// Embedding of the full chunk text
    pub full_embedding: Vec<f32>,
    /// Embeddings of individual mini-chunks when multipass is enabled
    pub mini_chunk_embeddings: Vec<Vec<f32>>,
}

/// A chunk as produced by the chunker, before embedding.
///
/// Invariant: a single document's chunks carry contiguous ids starting at 0
/// in section order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocAwareChunk {
    /// Chunk index within the document, starting at 0
    pub chunk_id: i64,
    /// Owning document id
    pub source_document_id: String,
    /// Chunk text content
    pub content: String,
    /// Title text prepended to the embedded representation
    pub title_prefix: String,
    /// Metadata rendered for the semantic (embedded) representation
    pub metadata_suffix_semantic: String,
    /// Metadata rendered for keyword matching
    pub metadata_suffix_keyword: String,
    /// Link of the section this chunk mostly came from
    pub source_link: Option<String>,
    /// Ids of large chunks this chunk participates in (multipass)
    pub large_chunk_reference_ids: Vec<i64>,
    /// Tokens reserved for contextual summaries (0 = no room)
    pub contextual_rag_reserved_tokens: usize,
    /// Whole-document summary, when contextual RAG produced one
    pub doc_summary: Option<String>,
    /// Chunk-in-document context, when contextual RAG produced one
    pub chunk_context: Option<String>,
}

impl DocAwareChunk {
    /// Compact identifier for log lines.
    #[must_use]
    pub fn short_descriptor(&self) -> String {
        format!("{}#{}", self.source_document_id, self.chunk_id)
    }
}

/// A fully-enriched chunk ready for the search index: embeddings plus
/// document-level metadata resolved under the per-document locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMetadataAwareIndexChunk {
    /// The underlying chunk
    pub chunk: DocAwareChunk,
    /// Embeddings for the chunk
    pub embeddings: ChunkEmbeddings,
    /// Access payload at indexing time
    pub access: DocumentAccess,
    /// Document sets the owning document belongs to
    pub document_sets: BTreeSet<String>,
    /// Document-level ranking boost
    pub boost: i64,
    /// Multiplicative boost from content classification
    pub aggregated_chunk_boost_factor: f32,
    /// Tenant that owns the chunk
    pub tenant_id: TenantId,
}

/// Per-chunk boost data persisted to the relational store after a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatableChunkData {
    /// Owning document id
    pub document_id: String,
    /// Chunk index within the document
    pub chunk_id: i64,
    /// Boost score recorded for the chunk
    pub boost_score: f32,
}
