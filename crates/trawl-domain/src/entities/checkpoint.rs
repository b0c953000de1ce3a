//! Connector checkpoints.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque, connector-defined resumable cursor.
///
/// The core persists `content` verbatim on the attempt row and never
/// inspects it; `has_more` alone drives the outer pull loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorCheckpoint {
    /// Connector-specific cursor state
    pub content: serde_json::Value,
    /// Whether another segment remains after this one
    pub has_more: bool,
}

impl ConnectorCheckpoint {
    /// The checkpoint every run starts from when nothing is resumable.
    #[must_use]
    pub fn dummy() -> Self {
        Self {
            content: serde_json::Value::Null,
            has_more: true,
        }
    }

    /// Serialize for persistence on the attempt row.
    ///
    /// # Errors
    /// Returns an error when the content cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a persisted checkpoint blob.
    ///
    /// # Errors
    /// Returns an error when the blob is not valid checkpoint JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
