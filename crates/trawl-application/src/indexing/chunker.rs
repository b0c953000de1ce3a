//! Tokenizer-aware chunker.
//!
//! Splits processed documents into chunks under the settings' token
//! budget, prepending the title and appending rendered metadata to the
//! embedded representation. A document's chunks carry contiguous ids
//! starting at 0, which is what makes re-indexing unchanged content emit
//! identical `(doc_id, chunk_id)` pairs.

use trawl_domain::entities::{DocAwareChunk, IndexingDocument, MetadataValue, SearchSettings};
use trawl_domain::ports::IndexingHeartbeat;
use unicode_segmentation::UnicodeSegmentation;

/// Tokens reserved per chunk for contextual summaries, when enabled and
/// the budget is large enough to afford them.
const CONTEXTUAL_RAG_RESERVED_TOKENS: usize = 512;

/// Chunks per multipass large-chunk group.
const LARGE_CHUNK_RATIO: usize = 4;

/// Word-level token estimate.
///
/// The embedding server does exact tokenization; this estimate only has
/// to be stable and conservative enough for packing.
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    text.unicode_words().count()
}

/// Settings-driven chunker.
pub struct Chunker {
    token_limit: usize,
    enable_multipass: bool,
    enable_contextual_rag: bool,
}

impl Chunker {
    /// Build a chunker from an index generation's settings.
    #[must_use]
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            token_limit: settings.chunk_token_limit.max(16),
            enable_multipass: settings.multipass_indexing,
            enable_contextual_rag: settings.enable_contextual_rag,
        }
    }

    /// The configured per-chunk token budget.
    #[must_use]
    pub fn chunk_token_limit(&self) -> usize {
        self.token_limit
    }

    /// Chunk a batch of processed documents.
    pub fn chunk(
        &self,
        documents: &[IndexingDocument],
        heartbeat: &dyn IndexingHeartbeat,
    ) -> Vec<DocAwareChunk> {
        let mut out = Vec::new();
        for doc in documents {
            self.chunk_document(doc, &mut out);
            heartbeat.progress("chunker", 1);
        }
        out
    }

    fn chunk_document(&self, doc: &IndexingDocument, out: &mut Vec<DocAwareChunk>) {
        let title = doc
            .document
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| doc.document.semantic_identifier.clone());
        let title_prefix = if title.trim().is_empty() {
            String::new()
        } else {
            format!("{title}\n")
        };

        let (metadata_semantic, metadata_keyword) = render_metadata(&doc.document.metadata);

        let reserved = if self.enable_contextual_rag
            && self.token_limit > 2 * CONTEXTUAL_RAG_RESERVED_TOKENS
        {
            CONTEXTUAL_RAG_RESERVED_TOKENS
        } else {
            0
        };

        let overhead =
            count_tokens(&title_prefix) + count_tokens(&metadata_semantic) + reserved;
        let content_budget = self.token_limit.saturating_sub(overhead).max(8);

        let mut chunk_id: i64 = 0;
        let doc_start = out.len();
        for section in &doc.processed_sections {
            if section.text.trim().is_empty() {
                continue;
            }
            for piece in split_by_token_budget(&section.text, content_budget) {
                out.push(DocAwareChunk {
                    chunk_id,
                    source_document_id: doc.document.id.clone(),
                    content: piece,
                    title_prefix: title_prefix.clone(),
                    metadata_suffix_semantic: metadata_semantic.clone(),
                    metadata_suffix_keyword: metadata_keyword.clone(),
                    source_link: section.link.clone(),
                    large_chunk_reference_ids: Vec::new(),
                    contextual_rag_reserved_tokens: reserved,
                    doc_summary: None,
                    chunk_context: None,
                });
                chunk_id += 1;
            }
        }

        if self.enable_multipass {
            let produced = out.len() - doc_start;
            for (i, chunk) in out[doc_start..].iter_mut().enumerate() {
                let group = (i / LARGE_CHUNK_RATIO) as i64;
                if produced > 1 {
                    chunk.large_chunk_reference_ids = vec![group];
                }
            }
        }
    }
}

/// Render the metadata map into semantic and keyword suffixes.
fn render_metadata(
    metadata: &std::collections::BTreeMap<String, MetadataValue>,
) -> (String, String) {
    if metadata.is_empty() {
        return (String::new(), String::new());
    }
    let mut semantic_lines = Vec::new();
    let mut keyword_parts = Vec::new();
    for (key, value) in metadata {
        match value {
            MetadataValue::One(v) => {
                semantic_lines.push(format!("\t{key}: {v}"));
                keyword_parts.push(v.clone());
            }
            MetadataValue::Many(vs) => {
                semantic_lines.push(format!("\t{key}: {}", vs.join(", ")));
                keyword_parts.extend(vs.iter().cloned());
            }
        }
    }
    (
        format!("\nMetadata:\n{}", semantic_lines.join("\n")),
        keyword_parts.join(" "),
    )
}

/// Split text into pieces of at most `budget` tokens on word boundaries.
fn split_by_token_budget(text: &str, budget: usize) -> Vec<String> {
    let words: Vec<(usize, &str)> = text.unicode_word_indices().collect();
    if words.len() <= budget {
        return vec![text.trim().to_owned()];
    }

    let mut pieces = Vec::new();
    let mut start_word = 0;
    while start_word < words.len() {
        let end_word = (start_word + budget).min(words.len());
        let byte_start = words[start_word].0;
        let byte_end = if end_word == words.len() {
            text.len()
        } else {
            words[end_word].0
        };
        pieces.push(text[byte_start..byte_end].trim().to_owned());
        start_word = end_word;
    }
    pieces
}
