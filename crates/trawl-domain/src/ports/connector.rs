//! Connector adapter ports.
//!
//! A source adapter implements one or more capability traits; the factory
//! detects capabilities at construction time and returns a tagged
//! [`ConnectorBundle`] the runtime matches on. Checkpointed pulls return an
//! explicit run object yielding items one at a time — no generator state
//! hidden in stack frames.

use async_trait::async_trait;

use crate::entities::{ConnectorCheckpoint, ConnectorFailure, Document, SlimDocument};
use crate::error::Result;

/// One item yielded by a connector run.
#[derive(Debug)]
pub enum ConnectorItem {
    /// A document to index
    Document(Box<Document>),
    /// A non-fatal failure; the run continues
    Failure(ConnectorFailure),
}

/// An in-flight checkpointed pull over one window segment.
///
/// `next` returning `Ok(None)` ends the segment; the caller then reads the
/// updated checkpoint and loops while `checkpoint().has_more`.
#[async_trait]
pub trait ConnectorRun: Send {
    /// Pull the next item.
    async fn next(&mut self) -> Result<Option<ConnectorItem>>;

    /// The checkpoint to persist for this segment.
    fn checkpoint(&self) -> ConnectorCheckpoint;
}

/// Checkpointed connector: resumable windowed pulls (preferred shape for
/// large sources).
#[async_trait]
pub trait CheckpointedConnector: Send + Sync {
    /// Validate configuration + credentials against the live source.
    async fn validate_connector_settings(&self) -> Result<()>;

    /// The checkpoint a fresh run starts from.
    fn build_dummy_checkpoint(&self) -> ConnectorCheckpoint;

    /// Parse and validate a persisted checkpoint blob.
    ///
    /// # Errors
    /// Returns an error when the blob is not a valid checkpoint for this
    /// connector.
    fn validate_checkpoint_json(&self, raw: &str) -> Result<ConnectorCheckpoint>;

    /// Begin pulling `[start, end)` from `checkpoint`.
    async fn load_from_checkpoint(
        &self,
        start_epoch: i64,
        end_epoch: i64,
        checkpoint: ConnectorCheckpoint,
    ) -> Result<Box<dyn ConnectorRun>>;
}

/// Poll connector: yields documents changed in `[start, end)`.
#[async_trait]
pub trait PollConnector: Send + Sync {
    /// Validate configuration + credentials against the live source.
    async fn validate_connector_settings(&self) -> Result<()>;

    /// Pull all documents changed in the window.
    async fn poll(&self, start_epoch: i64, end_epoch: i64) -> Result<Box<dyn ConnectorRun>>;
}

/// Load-state connector: yields everything it knows, unordered.
#[async_trait]
pub trait LoadConnector: Send + Sync {
    /// Validate configuration + credentials against the live source.
    async fn validate_connector_settings(&self) -> Result<()>;

    /// Pull every document.
    async fn load_all(&self) -> Result<Box<dyn ConnectorRun>>;
}

/// Slim connector: `(id, permissions)` records for ACL-only passes.
#[async_trait]
pub trait SlimConnector: Send + Sync {
    /// Retrieve slim documents for the window.
    async fn retrieve_all_slim_documents(
        &self,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<SlimDocument>>;
}

/// A constructed connector with its detected capabilities.
///
/// The runtime matches on the variant; a checkpointed shape is preferred
/// when a source offers several.
pub enum ConnectorBundle {
    /// Checkpointed windowed pulls
    Checkpointed(Box<dyn CheckpointedConnector>),
    /// Plain windowed pulls
    Poll(Box<dyn PollConnector>),
    /// Full-state dumps
    LoadState(Box<dyn LoadConnector>),
}

impl ConnectorBundle {
    /// Validate against the live source, whatever the shape.
    ///
    /// # Errors
    /// Propagates the adapter's validation error.
    pub async fn validate(&self) -> Result<()> {
        match self {
            Self::Checkpointed(c) => c.validate_connector_settings().await,
            Self::Poll(c) => c.validate_connector_settings().await,
            Self::LoadState(c) => c.validate_connector_settings().await,
        }
    }
}

/// Builds connector adapters from pair configuration.
///
/// Capability detection happens here, once, at construction; the runtime
/// only ever sees the tagged bundle.
pub trait ConnectorFactory: Send + Sync {
    /// Instantiate the adapter for a pair.
    ///
    /// # Errors
    /// Returns an error when the source is unknown or the configuration
    /// cannot construct a client.
    fn instantiate(
        &self,
        pair: &crate::entities::ConnectorCredentialPair,
    ) -> Result<ConnectorBundle>;
}
