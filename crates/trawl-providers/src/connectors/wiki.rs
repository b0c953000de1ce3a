//! Checkpointed wiki connector.
//!
//! Pulls pages from a wiki-style HTTP API through the resilient paginator,
//! so a flaky listing endpoint degrades page size down to single items and
//! a "use cursor" server switches pagination modes mid-run. The whole
//! position (paginator state) lives in the checkpoint, making runs
//! resumable after failures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trawl_application::runtime::{
    PageFetchError, PageFetcher, PageRequest, PageResponse, PaginatorState, ResilientPaginator,
    RetryPolicy, retry_honoring_rate_limits,
};
use trawl_domain::entities::{
    ConnectorCheckpoint, ConnectorFailure, Document, DocumentSource, MetadataValue, Section,
};
use trawl_domain::error::{ConnectorValidationError, Error, Result};
use trawl_domain::ports::{CheckpointedConnector, ConnectorItem, ConnectorRun};

/// Pages pulled per checkpoint segment; the attempt driver persists the
/// checkpoint between segments.
const PAGES_PER_SEGMENT: usize = 10;

/// Wall-clock budget for one page fetch including rate-limit waits.
const PAGE_FETCH_BUDGET: Duration = Duration::from_secs(600);

/// Connector configuration (the pair's `connector_config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Base URL of the wiki API
    pub base_url: String,
    /// Optional space/collection filter
    #[serde(default)]
    pub space: Option<String>,
    /// Page size for listing requests
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    50
}

/// Checkpoint content for the wiki connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WikiCheckpointContent {
    paginator: PaginatorState,
}

/// Transport over the wiki HTTP API.
///
/// A trait so tests can script server behavior (failures, cursor demands,
/// rate limits) without a live wiki.
#[async_trait]
pub trait WikiTransport: Send + Sync {
    /// Fetch one listing page of documents updated in `[start, end)`.
    async fn fetch_page(
        &self,
        request: &PageRequest,
        start_epoch: i64,
        end_epoch: i64,
    ) -> std::result::Result<PageResponse, PageFetchError>;

    /// Probe credentials and configuration against the live API.
    async fn probe(&self) -> Result<()>;
}

/// Production transport over `reqwest`.
pub struct HttpWikiTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    space: Option<String>,
}

impl HttpWikiTransport {
    /// Transport for the configured wiki.
    #[must_use]
    pub fn new(config: &WikiConfig, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token,
            space: config.space.clone(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn fetch_once(
        &self,
        request: &PageRequest,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<reqwest::Response> {
        let mut url = format!(
            "{}/api/content?updated_after={start_epoch}&updated_before={end_epoch}",
            self.base_url
        );
        if let Some(space) = &self.space {
            url.push_str(&format!("&space={space}"));
        }
        match request {
            PageRequest::Offset { start, limit } => {
                url.push_str(&format!("&start={start}&limit={limit}"));
            }
            PageRequest::Cursor { cursor, limit } => {
                url.push_str(&format!("&limit={limit}"));
                if let Some(cursor) = cursor {
                    url.push_str(&format!("&cursor={cursor}"));
                }
            }
        }

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| Error::network_with_source("wiki listing request failed", e))?;
        if response.status().as_u16() == 429 {
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
        Ok(response)
    }
}

#[derive(Deserialize)]
struct ListingBody {
    results: Vec<serde_json::Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[async_trait]
impl WikiTransport for HttpWikiTransport {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        start_epoch: i64,
        end_epoch: i64,
    ) -> std::result::Result<PageResponse, PageFetchError> {
        // rate limits are consumed here, honoring Retry-After, so the
        // paginator above only ever sees page-level failures
        let response = retry_honoring_rate_limits(
            RetryPolicy::provider_default(),
            PAGE_FETCH_BUDGET,
            "wiki_fetch_page",
            || self.fetch_once(request, start_epoch, end_epoch),
        )
        .await
        .map_err(PageFetchError::Fetch)?;

        let status = response.status();
        match status.as_u16() {
            410 => return Err(PageFetchError::CursorExpired),
            400 => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("cursor_required") {
                    return Err(PageFetchError::UseCursor);
                }
                return Err(PageFetchError::Fetch(Error::connector(format!(
                    "wiki listing rejected: {body}"
                ))));
            }
            _ if !status.is_success() => {
                return Err(PageFetchError::Fetch(Error::connector(format!(
                    "wiki listing failed with status {status}"
                ))));
            }
            _ => {}
        }

        let body: ListingBody = response.json().await.map_err(|e| {
            PageFetchError::Fetch(Error::network_with_source("undecodable wiki listing", e))
        })?;
        Ok(PageResponse {
            items: body.results,
            next_cursor: body.next_cursor,
        })
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/space", self.base_url);
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| Error::network_with_source("wiki probe failed", e))?;
        match response.status().as_u16() {
            200..=299 => Ok(()),
            401 => Err(ConnectorValidationError::CredentialExpired(
                "wiki rejected the token".to_owned(),
            )
            .into()),
            403 => Err(ConnectorValidationError::InsufficientPermissions(
                "token lacks access to the configured space".to_owned(),
            )
            .into()),
            404 => Err(ConnectorValidationError::Invalid(
                "wiki API endpoint not found; check the base URL".to_owned(),
            )
            .into()),
            status => Err(ConnectorValidationError::Unexpected(format!(
                "wiki probe returned status {status}"
            ))
            .into()),
        }
    }
}

/// The wiki connector.
pub struct WikiConnector {
    transport: Arc<dyn WikiTransport>,
    page_size: usize,
}

impl WikiConnector {
    /// Build from pair configuration + credential material.
    ///
    /// # Errors
    /// Returns an error when the configuration is malformed.
    pub fn new(config: &serde_json::Value, credential: &serde_json::Value) -> Result<Self> {
        let config: WikiConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::config_with_source("invalid wiki connector config", e))?;
        let token = credential
            .get("token")
            .and_then(|t| t.as_str())
            .map(str::to_owned);
        let page_size = config.page_size.max(1);
        Ok(Self {
            transport: Arc::new(HttpWikiTransport::new(&config, token)),
            page_size,
        })
    }

    /// Build over an explicit transport (tests).
    #[must_use]
    pub fn with_transport(transport: Arc<dyn WikiTransport>, page_size: usize) -> Self {
        Self {
            transport,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl CheckpointedConnector for WikiConnector {
    async fn validate_connector_settings(&self) -> Result<()> {
        self.transport.probe().await
    }

    fn build_dummy_checkpoint(&self) -> ConnectorCheckpoint {
        ConnectorCheckpoint {
            content: serde_json::to_value(WikiCheckpointContent::default())
                .unwrap_or(serde_json::Value::Null),
            has_more: true,
        }
    }

    fn validate_checkpoint_json(&self, raw: &str) -> Result<ConnectorCheckpoint> {
        let checkpoint = ConnectorCheckpoint::from_json(raw)?;
        if !checkpoint.content.is_null() {
            let _content: WikiCheckpointContent =
                serde_json::from_value(checkpoint.content.clone())?;
        }
        Ok(checkpoint)
    }

    async fn load_from_checkpoint(
        &self,
        start_epoch: i64,
        end_epoch: i64,
        checkpoint: ConnectorCheckpoint,
    ) -> Result<Box<dyn ConnectorRun>> {
        let content: WikiCheckpointContent = if checkpoint.content.is_null() {
            WikiCheckpointContent::default()
        } else {
            serde_json::from_value(checkpoint.content)?
        };
        Ok(Box::new(WikiRun {
            transport: Arc::clone(&self.transport),
            state: content.paginator,
            page_size: self.page_size,
            start_epoch,
            end_epoch,
            buffer: VecDeque::new(),
            pages_this_segment: 0,
        }))
    }
}

struct WikiRun {
    transport: Arc<dyn WikiTransport>,
    state: PaginatorState,
    page_size: usize,
    start_epoch: i64,
    end_epoch: i64,
    buffer: VecDeque<ConnectorItem>,
    pages_this_segment: usize,
}

/// Adapter: the paginator's fetcher interface over the wiki transport,
/// with the poll window bound in.
struct WindowedFetcher<'t> {
    transport: &'t dyn WikiTransport,
    start_epoch: i64,
    end_epoch: i64,
}

#[async_trait]
impl PageFetcher for WindowedFetcher<'_> {
    async fn fetch(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<PageResponse, PageFetchError> {
        self.transport
            .fetch_page(request, self.start_epoch, self.end_epoch)
            .await
    }
}

#[async_trait]
impl ConnectorRun for WikiRun {
    async fn next(&mut self) -> Result<Option<ConnectorItem>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.state.exhausted || self.pages_this_segment >= PAGES_PER_SEGMENT {
                return Ok(None);
            }

            let fetcher = WindowedFetcher {
                transport: self.transport.as_ref(),
                start_epoch: self.start_epoch,
                end_epoch: self.end_epoch,
            };
            let mut paginator =
                ResilientPaginator::new(&fetcher, self.state.clone(), self.page_size);
            let page = paginator.next_page().await?;
            for failure in paginator.take_failures() {
                self.buffer.push_back(ConnectorItem::Failure(failure));
            }
            self.state = paginator.state().clone();
            self.pages_this_segment += 1;

            let Some(items) = page else {
                self.state.exhausted = true;
                continue;
            };
            for item in items {
                match parse_wiki_page(&item) {
                    Ok(document) => {
                        self.buffer.push_back(ConnectorItem::Document(Box::new(document)));
                    }
                    Err(failure) => self.buffer.push_back(ConnectorItem::Failure(*failure)),
                }
            }
        }
    }

    fn checkpoint(&self) -> ConnectorCheckpoint {
        ConnectorCheckpoint {
            content: serde_json::to_value(WikiCheckpointContent {
                paginator: self.state.clone(),
            })
            .unwrap_or(serde_json::Value::Null),
            has_more: !self.state.exhausted,
        }
    }
}

fn parse_wiki_page(item: &serde_json::Value) -> std::result::Result<Document, Box<ConnectorFailure>> {
    let id = item
        .get("id")
        .and_then(|v| v.as_str().map(str::to_owned).or_else(|| v.as_i64().map(|n| n.to_string())))
        .ok_or_else(|| {
            Box::new(ConnectorFailure::for_entity(
                "unknown",
                "wiki page without an id",
            ))
        })?;

    let title = item
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();
    let body = item
        .get("body")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();
    let url = item.get("url").and_then(|v| v.as_str()).map(str::to_owned);
    let updated_at = item.get("updated_at").and_then(serde_json::Value::as_i64);

    let mut metadata = BTreeMap::new();
    if let Some(labels) = item.get("labels").and_then(|v| v.as_array()) {
        let values: Vec<String> = labels
            .iter()
            .filter_map(|l| l.as_str().map(str::to_owned))
            .collect();
        if !values.is_empty() {
            metadata.insert("labels".to_owned(), MetadataValue::Many(values));
        }
    }

    let author = item
        .get("author")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    Ok(Document {
        id: format!("WIKI_{id}"),
        semantic_identifier: if title.is_empty() { id } else { title.clone() },
        title: Some(title),
        sections: vec![Section::Text {
            text: body,
            link: url,
        }],
        metadata,
        doc_updated_at: updated_at,
        primary_owners: author.map(|a| vec![a]),
        secondary_owners: None,
        source: DocumentSource::Wiki,
        from_ingestion_api: false,
    })
}
