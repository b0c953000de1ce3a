//! Information-content classification for chunk boosting.

use trawl_domain::constants::indexing::{CONTENT_CLASSIFICATION_CUTOFF_TOKENS, DEFAULT_CHUNK_BOOST};
use trawl_domain::entities::DocAwareChunk;
use trawl_domain::ports::ContentClassifier;

use super::chunker::count_tokens;
use crate::runtime::{RetryPolicy, retry};

/// Multiplicative boost factor per chunk, aligned with the input order.
///
/// Only short chunks (at or under the cutoff) are classified; longer
/// chunks and any chunk the model fails on get the default boost. A batch
/// failure retries once more per the provider policy and then falls
/// through to defaults rather than failing the indexing batch.
pub async fn aggregated_chunk_boost_factors(
    chunks: &[DocAwareChunk],
    classifier: Option<&dyn ContentClassifier>,
) -> Vec<f32> {
    let Some(classifier) = classifier else {
        return vec![DEFAULT_CHUNK_BOOST; chunks.len()];
    };

    let short_indices: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| count_tokens(&c.content) <= CONTENT_CLASSIFICATION_CUTOFF_TOKENS)
        .map(|(i, _)| i)
        .collect();
    if short_indices.is_empty() {
        return vec![DEFAULT_CHUNK_BOOST; chunks.len()];
    }

    let contents: Vec<String> = short_indices
        .iter()
        .map(|&i| chunks[i].content.clone())
        .collect();

    let mut scores = vec![DEFAULT_CHUNK_BOOST; chunks.len()];
    let result = retry(RetryPolicy::provider_default(), "classify_content", || {
        let contents = contents.clone();
        async move { classifier.classify(&contents).await }
    })
    .await;

    match result {
        Ok(predictions) if predictions.len() == short_indices.len() => {
            for (&chunk_index, score) in short_indices.iter().zip(predictions) {
                scores[chunk_index] = score;
            }
        }
        Ok(predictions) => {
            tracing::error!(
                expected = short_indices.len(),
                got = predictions.len(),
                "Content classifier returned a mismatched score count, using defaults"
            );
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "Content classification failed after retries, using default boosts"
            );
        }
    }
    scores
}
