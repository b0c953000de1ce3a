//! Contextual summaries for chunks (contextual RAG).
//!
//! When enabled by the settings generation, each document gets a summary
//! and each chunk gets a "context of this chunk within the document"
//! blurb, both attached to the chunk before embedding. Rate limits during
//! context generation degrade to empty context instead of failing the
//! batch.

use std::collections::BTreeMap;

use trawl_domain::entities::DocAwareChunk;
use trawl_domain::error::Error;
use trawl_domain::ports::TextGenerator;

use super::chunker::count_tokens;

const DOCUMENT_SUMMARY_PROMPT: &str = "Summarize the following document in a few sentences, \
capturing what it is about and what a reader would find in it.\n\nDocument:\n";

const CHUNK_CONTEXT_PROMPT_DOC: &str = "Here is a document:\n";

const CHUNK_CONTEXT_PROMPT_CHUNK: &str = "\n\nHere is a chunk from that document:\n";

const CHUNK_CONTEXT_PROMPT_TAIL: &str =
    "\n\nIn one or two sentences, situate the chunk within the document for retrieval purposes.";

/// Output budget for generated summaries.
const MAX_CONTEXT_TOKENS: usize = 512;

/// Documents under this many tokens are included verbatim in chunk-context
/// prompts; longer documents fall back to their summary.
const MAX_TOKENS_FOR_FULL_INCLUSION: usize = 4096;

/// Trim `text` to roughly `budget` tokens, dropping the middle.
fn trim_middle(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= budget || budget < 8 {
        return text.to_owned();
    }
    let half = budget / 2;
    let head = words[..half].join(" ");
    let tail = words[words.len() - half..].join(" ");
    format!("{head}\n[...]\n{tail}")
}

/// Attach doc summaries and chunk contexts to `chunks`, grouped by doc.
///
/// `doc_texts` maps document id to its full processed text. Chunks whose
/// `contextual_rag_reserved_tokens` is zero are left untouched (the
/// chunker decided there was no room).
pub async fn add_contextual_summaries(
    chunks: &mut [DocAwareChunk],
    doc_texts: &BTreeMap<String, String>,
    generator: &dyn TextGenerator,
    use_doc_summary: bool,
    use_chunk_summary: bool,
) {
    if !use_doc_summary && !use_chunk_summary {
        return;
    }

    let mut doc_order: Vec<String> = Vec::new();
    for chunk in chunks.iter() {
        if !doc_order.contains(&chunk.source_document_id) {
            doc_order.push(chunk.source_document_id.clone());
        }
    }

    for doc_id in doc_order {
        let indices: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.source_document_id == doc_id)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() || chunks[indices[0]].contextual_rag_reserved_tokens == 0 {
            continue;
        }
        let Some(doc_text) = doc_texts.get(&doc_id) else {
            continue;
        };

        let summary_budget =
            generator.max_input_tokens().saturating_sub(count_tokens(DOCUMENT_SUMMARY_PROMPT));

        let mut doc_summary: Option<String> = None;
        if use_doc_summary {
            let prompt = format!(
                "{DOCUMENT_SUMMARY_PROMPT}{}",
                trim_middle(doc_text, summary_budget)
            );
            match generator.generate(&prompt, MAX_CONTEXT_TOKENS).await {
                Ok(summary) => {
                    doc_summary = Some(summary.clone());
                    for &i in &indices {
                        chunks[i].doc_summary = Some(summary.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(doc = %doc_id, error = %e, "Document summary generation failed");
                }
            }
        }

        if use_chunk_summary {
            let doc_tokens = count_tokens(doc_text);
            let doc_info = if doc_tokens <= MAX_TOKENS_FOR_FULL_INCLUSION {
                doc_text.clone()
            } else if let Some(summary) = &doc_summary {
                summary.clone()
            } else {
                // doc too long and summaries off; summarize just for context
                let prompt = format!(
                    "{DOCUMENT_SUMMARY_PROMPT}{}",
                    trim_middle(doc_text, summary_budget)
                );
                match generator.generate(&prompt, MAX_CONTEXT_TOKENS).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        tracing::warn!(doc = %doc_id, error = %e, "Fallback summary failed");
                        continue;
                    }
                }
            };

            for &i in &indices {
                let prompt = format!(
                    "{CHUNK_CONTEXT_PROMPT_DOC}{doc_info}{CHUNK_CONTEXT_PROMPT_CHUNK}{}{CHUNK_CONTEXT_PROMPT_TAIL}",
                    chunks[i].content
                );
                match generator.generate(&prompt, MAX_CONTEXT_TOKENS).await {
                    Ok(context) => chunks[i].chunk_context = Some(context),
                    Err(e @ Error::RateLimited { .. }) => {
                        tracing::warn!(
                            doc = %doc_id,
                            chunk = chunks[i].chunk_id,
                            error = %e,
                            "Rate limit adding chunk context"
                        );
                        chunks[i].chunk_context = Some(String::new());
                    }
                    Err(e) => {
                        tracing::warn!(
                            doc = %doc_id,
                            chunk = chunks[i].chunk_id,
                            error = %e,
                            "Error adding chunk context"
                        );
                        chunks[i].chunk_context = Some(String::new());
                    }
                }
            }
        }
    }
}
