//! Chunk embedding with per-document failure isolation.

use std::collections::BTreeMap;

use trawl_domain::entities::{ChunkEmbeddings, ConnectorFailure, DocAwareChunk};
use trawl_domain::ports::{EmbedTextKind, EmbeddingProvider, IndexingHeartbeat};

use crate::runtime::{RetryPolicy, retry};

/// The text actually embedded for a chunk: title, contextual summaries,
/// content, and the semantic metadata suffix.
#[must_use]
pub fn build_embed_text(chunk: &DocAwareChunk) -> String {
    let mut text = String::new();
    text.push_str(&chunk.title_prefix);
    if let Some(summary) = &chunk.doc_summary {
        text.push_str(summary);
        text.push('\n');
    }
    if let Some(context) = &chunk.chunk_context {
        text.push_str(context);
        text.push('\n');
    }
    text.push_str(&chunk.content);
    text.push_str(&chunk.metadata_suffix_semantic);
    text
}

/// Embed chunks document by document.
///
/// A document whose chunks fail to embed becomes a
/// [`ConnectorFailure`] and the batch continues; successful documents keep
/// their chunks in input order.
pub async fn embed_chunks_with_failure_handling(
    chunks: Vec<DocAwareChunk>,
    embedder: &dyn EmbeddingProvider,
    heartbeat: &dyn IndexingHeartbeat,
) -> (Vec<(DocAwareChunk, ChunkEmbeddings)>, Vec<ConnectorFailure>) {
    // group per document, preserving first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut by_doc: BTreeMap<String, Vec<DocAwareChunk>> = BTreeMap::new();
    for chunk in chunks {
        if !by_doc.contains_key(&chunk.source_document_id) {
            order.push(chunk.source_document_id.clone());
        }
        by_doc
            .entry(chunk.source_document_id.clone())
            .or_default()
            .push(chunk);
    }

    let mut embedded = Vec::new();
    let mut failures = Vec::new();
    for doc_id in order {
        let Some(doc_chunks) = by_doc.remove(&doc_id) else {
            continue;
        };
        let texts: Vec<String> = doc_chunks.iter().map(build_embed_text).collect();
        let link = doc_chunks
            .first()
            .and_then(|c| c.source_link.clone());

        let result = retry(RetryPolicy::provider_default(), "embed_batch", || {
            let texts = texts.clone();
            async move { embedder.embed_batch(&texts, EmbedTextKind::Passage).await }
        })
        .await;

        match result {
            Ok(vectors) if vectors.len() == doc_chunks.len() => {
                for (chunk, vector) in doc_chunks.into_iter().zip(vectors) {
                    embedded.push((
                        chunk,
                        ChunkEmbeddings {
                            full_embedding: vector,
                            mini_chunk_embeddings: Vec::new(),
                        },
                    ));
                }
                heartbeat.progress("embedder", 1);
            }
            Ok(vectors) => {
                tracing::error!(
                    doc = %doc_id,
                    expected = doc_chunks.len(),
                    got = vectors.len(),
                    "Embedding provider returned the wrong number of vectors"
                );
                failures.push(ConnectorFailure::for_document(
                    doc_id,
                    link,
                    "embedding provider returned a mismatched vector count",
                ));
            }
            Err(e) => {
                tracing::error!(doc = %doc_id, error = %e, "Failed to embed document chunks");
                failures.push(ConnectorFailure::for_document(
                    doc_id,
                    link,
                    format!("embedding failed: {e}"),
                ));
            }
        }
    }
    (embedded, failures)
}
