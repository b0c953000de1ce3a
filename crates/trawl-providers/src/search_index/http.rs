//! HTTP search index client.
//!
//! JSON client for the external document index. Writes are wrapped in the
//! shared retry combinator; 429 responses become typed rate-limit errors
//! honoring the server's `Retry-After`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use trawl_application::runtime::{RetryPolicy, retry};
use trawl_domain::entities::{DocMetadataAwareIndexChunk, SearchSettings};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{
    DocumentIndexFields, IndexBatchParams, IndexBatchResponse, InsertionRecord, SearchIndexProvider,
};
use trawl_domain::value_objects::TenantId;

#[derive(Serialize)]
struct ChunkPayload<'a> {
    document_id: &'a str,
    chunk_id: i64,
    content: &'a str,
    title_prefix: &'a str,
    metadata_suffix_keyword: &'a str,
    source_link: Option<&'a str>,
    embedding: &'a [f32],
    acl_entries: Vec<String>,
    document_sets: Vec<&'a str>,
    boost: i64,
    aggregated_chunk_boost_factor: f32,
    large_chunk_reference_ids: &'a [i64],
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    tenant_id: &'a str,
    chunks: Vec<ChunkPayload<'a>>,
    doc_id_to_previous_chunk_cnt: &'a BTreeMap<String, Option<i64>>,
    doc_id_to_new_chunk_cnt: &'a BTreeMap<String, i64>,
    large_chunks_enabled: bool,
}

#[derive(Deserialize)]
struct IndexResponseBody {
    records: Vec<IndexRecordBody>,
    #[serde(default)]
    failures: Vec<IndexFailureBody>,
}

#[derive(Deserialize)]
struct IndexRecordBody {
    document_id: String,
    already_existed: bool,
}

#[derive(Deserialize)]
struct IndexFailureBody {
    document_id: String,
    message: String,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    tenant_id: &'a str,
    chunk_count: Option<i64>,
    acl_entries: Option<Vec<String>>,
    document_sets: Option<Vec<&'a str>>,
    boost: Option<i64>,
    hidden: Option<bool>,
}

#[derive(Deserialize)]
struct AffectedBody {
    chunks_affected: u64,
}

/// HTTP-backed [`SearchIndexProvider`].
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchIndex {
    /// Client against the index API at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
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
        let body = response.text().await.unwrap_or_default();
        Err(Error::search_index_status(
            format!("{context} failed: {status} {body}"),
            status.as_u16(),
        ))
    }
}

#[async_trait::async_trait]
impl SearchIndexProvider for HttpSearchIndex {
    async fn ensure_ready(&self, settings: &SearchSettings) -> Result<()> {
        let url = format!("{}/indexes/{}", self.base_url, settings.index_name);
        let body = serde_json::json!({
            "dimensions": settings.dimensions,
            "multipass": settings.multipass_indexing,
        });
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::network_with_source("index schema request failed", e))?;
        Self::check(response, "ensure_ready").await?;
        Ok(())
    }

    async fn index(
        &self,
        index_name: &str,
        chunks: &[DocMetadataAwareIndexChunk],
        params: &IndexBatchParams,
    ) -> Result<IndexBatchResponse> {
        let url = format!("{}/indexes/{}/batch", self.base_url, index_name);
        let tenant = params.tenant_id.to_string();
        let payload = IndexRequest {
            tenant_id: &tenant,
            chunks: chunks
                .iter()
                .map(|c| ChunkPayload {
                    document_id: &c.chunk.source_document_id,
                    chunk_id: c.chunk.chunk_id,
                    content: &c.chunk.content,
                    title_prefix: &c.chunk.title_prefix,
                    metadata_suffix_keyword: &c.chunk.metadata_suffix_keyword,
                    source_link: c.chunk.source_link.as_deref(),
                    embedding: &c.embeddings.full_embedding,
                    acl_entries: c.access.to_acl_entries(),
                    document_sets: c.document_sets.iter().map(String::as_str).collect(),
                    boost: c.boost,
                    aggregated_chunk_boost_factor: c.aggregated_chunk_boost_factor,
                    large_chunk_reference_ids: &c.chunk.large_chunk_reference_ids,
                })
                .collect(),
            doc_id_to_previous_chunk_cnt: &params.doc_id_to_previous_chunk_cnt,
            doc_id_to_new_chunk_cnt: &params.doc_id_to_new_chunk_cnt,
            large_chunks_enabled: params.large_chunks_enabled,
        };

        let body = retry(RetryPolicy::provider_default(), "index_batch", || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| Error::network_with_source("index batch request failed", e))?;
            Self::check(response, "index_batch")
                .await?
                .json::<IndexResponseBody>()
                .await
                .map_err(|e| Error::network_with_source("undecodable index response", e))
        })
        .await?;

        Ok(IndexBatchResponse {
            records: body
                .records
                .into_iter()
                .map(|r| InsertionRecord {
                    document_id: r.document_id,
                    already_existed: r.already_existed,
                })
                .collect(),
            failures: body
                .failures
                .into_iter()
                .map(|f| {
                    trawl_domain::entities::ConnectorFailure::for_document(
                        f.document_id,
                        None,
                        f.message,
                    )
                })
                .collect(),
        })
    }

    async fn update_single(
        &self,
        index_name: &str,
        document_id: &str,
        tenant_id: &TenantId,
        chunk_count: Option<i64>,
        fields: &DocumentIndexFields,
    ) -> Result<u64> {
        let url = format!(
            "{}/indexes/{}/documents/{}/fields",
            self.base_url, index_name, document_id
        );
        let tenant = tenant_id.to_string();
        let payload = UpdateRequest {
            tenant_id: &tenant,
            chunk_count,
            acl_entries: fields.access.as_ref().map(|a| a.to_acl_entries()),
            document_sets: fields
                .document_sets
                .as_ref()
                .map(|s| s.iter().map(String::as_str).collect()),
            boost: fields.boost,
            hidden: fields.hidden,
        };
        let response = self
            .client
            .put(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::network_with_source("update_single request failed", e))?;
        let body: AffectedBody = Self::check(response, "update_single")
            .await?
            .json()
            .await
            .map_err(|e| Error::network_with_source("undecodable update response", e))?;
        Ok(body.chunks_affected)
    }

    async fn delete(
        &self,
        index_name: &str,
        document_id: &str,
        tenant_id: &TenantId,
    ) -> Result<u64> {
        let url = format!(
            "{}/indexes/{}/documents/{}",
            self.base_url, index_name, document_id
        );
        let response = self
            .client
            .delete(&url)
            .query(&[("tenant_id", tenant_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::network_with_source("delete request failed", e))?;
        let body: AffectedBody = Self::check(response, "delete")
            .await?
            .json()
            .await
            .map_err(|e| Error::network_with_source("undecodable delete response", e))?;
        Ok(body.chunks_affected)
    }
}
