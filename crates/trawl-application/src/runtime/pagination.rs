//! Resilient pagination over flaky list endpoints.
//!
//! Two fallbacks are layered over a plain page fetcher:
//!
//! - **Partial-page fallback**: a failing page at `limit=L` is retried at
//!   `L/2` down to 1; at 1 the failing item is recorded as a
//!   [`ConnectorFailure`] and skipped, and pagination continues. The limit
//!   resets for the next page.
//! - **Cursor fallback**: a "use cursor" response switches to cursor
//!   pagination; an expired cursor restarts the paginator from the
//!   beginning and fast-forwards past everything already yielded.
//!
//! The paginator's whole position lives in the serializable
//! [`PaginatorState`] so connectors can persist it inside their
//! checkpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trawl_domain::entities::ConnectorFailure;
use trawl_domain::error::{Error, Result};

/// One page request issued to the fetcher.
#[derive(Debug, Clone)]
pub enum PageRequest {
    /// Offset-based pagination
    Offset {
        /// Index of the first item wanted
        start: usize,
        /// Page size
        limit: usize,
    },
    /// Cursor-based pagination; `None` restarts from the beginning
    Cursor {
        /// Opaque continuation cursor
        cursor: Option<String>,
        /// Page size
        limit: usize,
    },
}

/// One fetched page.
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    /// The page's items, in source order
    pub items: Vec<serde_json::Value>,
    /// Cursor for the next page, when the source paginates by cursor
    pub next_cursor: Option<String>,
}

/// How a page fetch can fail, beyond a plain error.
#[derive(Debug)]
pub enum PageFetchError {
    /// The source demands cursor pagination for this listing
    UseCursor,
    /// The continuation cursor is no longer valid
    CursorExpired,
    /// Anything else; subject to partial-page fallback
    Fetch(Error),
}

/// A source-specific page fetcher.
///
/// Rate-limit handling belongs inside implementations (wrap the transport
/// call in the retry combinator); the paginator only sees the final
/// outcome per page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page.
    async fn fetch(&self, request: &PageRequest) -> std::result::Result<PageResponse, PageFetchError>;
}

/// The paginator's full position, persisted inside connector checkpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginatorState {
    /// Whether cursor mode is active
    pub use_cursor: bool,
    /// Continuation cursor in cursor mode
    pub cursor: Option<String>,
    /// Next item index in offset mode
    pub start: usize,
    /// Total items yielded so far (drives cursor-expiry fast-forward)
    pub num_retrieved: usize,
    /// Items still to skip after a cursor restart
    pub fast_forward: usize,
    /// The source reported the end of the listing
    pub exhausted: bool,
}

/// Paginator applying both fallbacks over a [`PageFetcher`].
pub struct ResilientPaginator<'f> {
    fetcher: &'f dyn PageFetcher,
    state: PaginatorState,
    page_limit: usize,
    failures: Vec<ConnectorFailure>,
}

impl<'f> ResilientPaginator<'f> {
    /// Build a paginator resuming from `state`.
    pub fn new(fetcher: &'f dyn PageFetcher, state: PaginatorState, page_limit: usize) -> Self {
        Self {
            fetcher,
            state,
            page_limit: page_limit.max(1),
            failures: Vec::new(),
        }
    }

    /// Current position, for checkpointing.
    #[must_use]
    pub fn state(&self) -> &PaginatorState {
        &self.state
    }

    /// Drain item-level failures recorded since the last call.
    pub fn take_failures(&mut self) -> Vec<ConnectorFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Fetch the next page of items; `None` once the listing is exhausted.
    ///
    /// A returned page may be empty when every item in its span failed at
    /// `limit=1`; the failures are available via [`Self::take_failures`].
    pub async fn next_page(&mut self) -> Result<Option<Vec<serde_json::Value>>> {
        if self.state.exhausted {
            return Ok(None);
        }
        if self.state.use_cursor {
            self.next_cursor_page().await
        } else {
            self.next_offset_page().await
        }
    }

    async fn next_offset_page(&mut self) -> Result<Option<Vec<serde_json::Value>>> {
        let span = self.page_limit;
        let mut collected: Vec<serde_json::Value> = Vec::new();
        let mut covered = 0usize;
        let mut limit = span;

        while covered < span && !self.state.exhausted {
            let want = limit.min(span - covered);
            let request = PageRequest::Offset {
                start: self.state.start + covered,
                limit: want,
            };
            match self.fetcher.fetch(&request).await {
                Ok(response) => {
                    let got = response.items.len();
                    collected.extend(response.items);
                    covered += got;
                    if got < want {
                        self.state.exhausted = true;
                    }
                }
                Err(PageFetchError::UseCursor) => {
                    tracing::warn!("Source demands cursor pagination, switching modes");
                    self.state.use_cursor = true;
                    self.state.cursor = None;
                    self.state.fast_forward = self.state.num_retrieved + collected.len();
                    if collected.is_empty() {
                        return self.next_cursor_page().await;
                    }
                    break;
                }
                Err(PageFetchError::CursorExpired) | Err(PageFetchError::Fetch(_)) if limit > 1 => {
                    let new_limit = (limit / 2).max(1);
                    tracing::warn!(
                        start = self.state.start + covered,
                        from_limit = limit,
                        to_limit = new_limit,
                        "Page fetch failed, reducing page size and retrying"
                    );
                    limit = new_limit;
                }
                Err(PageFetchError::CursorExpired) | Err(PageFetchError::Fetch(_)) => {
                    // limit == 1: record the poison item and move past it
                    let position = self.state.start + covered;
                    tracing::error!(position, "Single item fetch failed, skipping");
                    self.failures.push(ConnectorFailure::for_entity(
                        format!("item@{position}"),
                        format!("failed to fetch item at position {position}"),
                    ));
                    covered += 1;
                }
            }
        }

        self.state.start += covered;
        self.state.num_retrieved += collected.len();
        if collected.is_empty() && self.state.exhausted {
            return Ok(None);
        }
        Ok(Some(collected))
    }

    async fn next_cursor_page(&mut self) -> Result<Option<Vec<serde_json::Value>>> {
        loop {
            let request = PageRequest::Cursor {
                cursor: self.state.cursor.clone(),
                limit: self.page_limit,
            };
            match self.fetcher.fetch(&request).await {
                Ok(response) => {
                    let got = response.items.len();
                    self.state.cursor = response.next_cursor;
                    if got == 0 || self.state.cursor.is_none() {
                        self.state.exhausted = true;
                    }

                    let mut items = response.items;
                    if self.state.fast_forward > 0 {
                        let skip = self.state.fast_forward.min(items.len());
                        items.drain(0..skip);
                        self.state.fast_forward -= skip;
                        if items.is_empty() && !self.state.exhausted {
                            continue;
                        }
                    }

                    self.state.num_retrieved += items.len();
                    if items.is_empty() && self.state.exhausted {
                        return Ok(None);
                    }
                    return Ok(Some(items));
                }
                Err(PageFetchError::CursorExpired) => {
                    tracing::warn!(
                        num_retrieved = self.state.num_retrieved,
                        "Cursor expired, restarting pagination and fast-forwarding"
                    );
                    self.state.cursor = None;
                    self.state.fast_forward = self.state.num_retrieved;
                }
                Err(PageFetchError::UseCursor) => {
                    return Err(Error::connector(
                        "source demanded cursor pagination while already in cursor mode",
                    ));
                }
                Err(PageFetchError::Fetch(e)) => return Err(e),
            }
        }
    }
}
