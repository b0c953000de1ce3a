//! Connector factory.

use trawl_domain::entities::{ConnectorCredentialPair, DocumentSource};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{ConnectorBundle, ConnectorFactory};

use super::files::FilesConnector;
use super::wiki::WikiConnector;

/// Source → adapter construction, with capability detection done once.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnectorFactory;

impl DefaultConnectorFactory {
    /// The factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ConnectorFactory for DefaultConnectorFactory {
    fn instantiate(&self, pair: &ConnectorCredentialPair) -> Result<ConnectorBundle> {
        match pair.source {
            DocumentSource::Wiki => Ok(ConnectorBundle::Checkpointed(Box::new(
                WikiConnector::new(&pair.connector_config, &pair.credential_json)?,
            ))),
            DocumentSource::Files => Ok(ConnectorBundle::LoadState(Box::new(
                FilesConnector::new(&pair.connector_config)?,
            ))),
            DocumentSource::IngestionApi => Err(Error::invalid_argument(
                "ingestion-api pairs are push-only and never pulled",
            )),
        }
    }
}
