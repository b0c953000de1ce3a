//! Model server HTTP client.
//!
//! One client covers the model server's surfaces: bi-encoder embeddings,
//! information-content classification, image summarization, and text
//! generation for contextual summaries. 429 responses become typed
//! rate-limit errors so the shared retry layer honors `Retry-After`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    ContentClassifier, EmbedTextKind, EmbeddingProvider, TextGenerator, VisionProvider,
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model_name: &'a str,
    text_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    contents: &'a [String],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    content_boost_factors: Vec<f32>,
}

#[derive(Serialize)]
struct ImageSummaryRequest<'a> {
    image_file_name: &'a str,
    context_name: &'a str,
}

#[derive(Deserialize)]
struct ImageSummaryResponse {
    summary: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// HTTP client for the model server.
pub struct ModelServerClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    dimensions: usize,
    max_input_tokens: usize,
}

impl ModelServerClient {
    /// Client for `model_name` served at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model_name: model_name.into(),
            dimensions,
            max_input_tokens: 8192,
        }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
        context: &str,
    ) -> Result<Resp> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::network_with_source(format!("{context} request failed"), e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return Err(Error::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::inference(format!(
                "{context} failed: {status} {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::network_with_source(format!("undecodable {context} response"), e))
    }
}

#[async_trait]
impl EmbeddingProvider for ModelServerClient {
    async fn embed_batch(&self, texts: &[String], kind: EmbedTextKind) -> Result<Vec<Vec<f32>>> {
        let text_type = match kind {
            EmbedTextKind::Passage => "passage",
            EmbedTextKind::Query => "query",
        };
        let response: EmbedResponse = self
            .post_json(
                "/encoder/bi-encoder-embed",
                &EmbedRequest {
                    texts,
                    model_name: &self.model_name,
                    text_type,
                },
                "embed",
            )
            .await?;
        if response.embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "model server returned {} vectors for {} texts",
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "model-server"
    }

    async fn warm_up(&self) -> Result<()> {
        let warm_text = vec!["warm up".to_owned()];
        self.embed_batch(&warm_text, EmbedTextKind::Passage).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentClassifier for ModelServerClient {
    async fn classify(&self, contents: &[String]) -> Result<Vec<f32>> {
        let response: ClassifyResponse = self
            .post_json(
                "/custom/content-classification",
                &ClassifyRequest { contents },
                "classify",
            )
            .await?;
        Ok(response.content_boost_factors)
    }
}

#[async_trait]
impl VisionProvider for ModelServerClient {
    async fn summarize_image(
        &self,
        image_file_name: &str,
        context_name: &str,
    ) -> Result<Option<String>> {
        let response: ImageSummaryResponse = self
            .post_json(
                "/custom/image-summary",
                &ImageSummaryRequest {
                    image_file_name,
                    context_name,
                },
                "image summary",
            )
            .await?;
        Ok(response.summary)
    }
}

#[async_trait]
impl TextGenerator for ModelServerClient {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let response: GenerateResponse = self
            .post_json(
                "/custom/generate",
                &GenerateRequest { prompt, max_tokens },
                "generate",
            )
            .await?;
        Ok(response.text)
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }
}
