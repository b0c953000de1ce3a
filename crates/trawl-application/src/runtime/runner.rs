//! Connector runner: one window segment at a time.

use trawl_domain::entities::{ConnectorCheckpoint, Document, Section};
use trawl_domain::error::Result;
use trawl_domain::ports::{ConnectorBundle, ConnectorRun};
use trawl_domain::utils::text::strip_nul;

/// Drives a connector bundle through window segments.
///
/// The three adapter shapes normalize to the same [`ConnectorRun`]
/// interface here; poll and load-state shapes simply produce a single
/// segment whose checkpoint reports `has_more = false`.
pub struct ConnectorRunner {
    bundle: ConnectorBundle,
    window_start: i64,
    window_end: i64,
}

impl ConnectorRunner {
    /// Build a runner for one poll window.
    #[must_use]
    pub fn new(bundle: ConnectorBundle, window_start: i64, window_end: i64) -> Self {
        Self {
            bundle,
            window_start,
            window_end,
        }
    }

    /// The checkpoint a fresh run starts from.
    #[must_use]
    pub fn initial_checkpoint(&self) -> ConnectorCheckpoint {
        match &self.bundle {
            ConnectorBundle::Checkpointed(c) => c.build_dummy_checkpoint(),
            ConnectorBundle::Poll(_) | ConnectorBundle::LoadState(_) => {
                ConnectorCheckpoint::dummy()
            }
        }
    }

    /// Validate a persisted checkpoint blob for resumption.
    ///
    /// # Errors
    /// Returns an error when the blob is invalid for this connector.
    pub fn validate_checkpoint_json(&self, raw: &str) -> Result<ConnectorCheckpoint> {
        match &self.bundle {
            ConnectorBundle::Checkpointed(c) => c.validate_checkpoint_json(raw),
            ConnectorBundle::Poll(_) | ConnectorBundle::LoadState(_) => {
                ConnectorCheckpoint::from_json(raw)
            }
        }
    }

    /// Start pulling one segment from `checkpoint`.
    pub async fn start_segment(
        &self,
        checkpoint: ConnectorCheckpoint,
    ) -> Result<Box<dyn ConnectorRun>> {
        match &self.bundle {
            ConnectorBundle::Checkpointed(c) => {
                c.load_from_checkpoint(self.window_start, self.window_end, checkpoint)
                    .await
            }
            ConnectorBundle::Poll(c) => c.poll(self.window_start, self.window_end).await,
            ConnectorBundle::LoadState(c) => c.load_all().await,
        }
    }
}

/// Strip NUL characters from every text field of a document.
///
/// The relational store rejects NUL bytes in text columns; some sources
/// emit them in ids, titles and section text.
#[must_use]
pub fn strip_null_characters(mut doc: Document) -> Document {
    if trawl_domain::utils::text::has_nul(&doc.id) {
        tracing::warn!(doc = %doc.id, "NUL characters found in document ID");
        doc.id = strip_nul(&doc.id);
    }
    if let Some(title) = &doc.title
        && trawl_domain::utils::text::has_nul(title)
    {
        tracing::warn!(doc = %doc.id, "NUL characters found in document title");
        doc.title = Some(strip_nul(title));
    }
    if trawl_domain::utils::text::has_nul(&doc.semantic_identifier) {
        tracing::warn!(doc = %doc.id, "NUL characters found in semantic identifier");
        doc.semantic_identifier = strip_nul(&doc.semantic_identifier);
    }
    for section in &mut doc.sections {
        match section {
            Section::Text { text, link } => {
                *text = strip_nul(text);
                if let Some(l) = link
                    && trawl_domain::utils::text::has_nul(l)
                {
                    *link = Some(strip_nul(l));
                }
            }
            Section::Image { link, .. } => {
                if let Some(l) = link
                    && trawl_domain::utils::text::has_nul(l)
                {
                    *link = Some(strip_nul(l));
                }
            }
        }
    }
    doc
}
