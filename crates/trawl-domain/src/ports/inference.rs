//! Inference ports: embeddings, content classification, vision, generation.
//!
//! Models are owned by the process that constructs the providers and
//! passed by reference; there are no module-scope caches or lazy loads.

use async_trait::async_trait;

use crate::error::Result;

/// What the text will be used for; some models embed queries and passages
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTextKind {
    /// Content being indexed
    Passage,
    /// A search query
    Query,
}

/// Embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts in order.
    async fn embed_batch(&self, texts: &[String], kind: EmbedTextKind) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Provider name for logs and config plumbing.
    fn provider_name(&self) -> &str;

    /// Load/prime the model so the first real batch is not surprisingly
    /// slow. Called by the beat after a settings swap.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Information-content classification for short chunks.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Multiplicative boost factor per input, aligned by index.
    async fn classify(&self, contents: &[String]) -> Result<Vec<f32>>;
}

/// Vision-capable summarizer for image sections.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Summarize an image to text; `None` when the model declines.
    async fn summarize_image(
        &self,
        image_file_name: &str,
        context_name: &str,
    ) -> Result<Option<String>>;
}

/// Text generation for contextual summaries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a prompt.
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;

    /// The model's input token budget, for prompt truncation.
    fn max_input_tokens(&self) -> usize;
}
