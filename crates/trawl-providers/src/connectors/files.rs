//! Load-state filesystem connector.
//!
//! Treats a directory of text/markdown files as a document source. Small
//! sources only: every run yields the full state, so the pipeline's
//! freshness skip (via file mtimes) is what keeps re-runs cheap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trawl_domain::entities::{
    ConnectorCheckpoint, ConnectorFailure, Document, DocumentSource, Section,
};
use trawl_domain::error::{ConnectorValidationError, Error, Result};
use trawl_domain::ports::{ConnectorItem, ConnectorRun, LoadConnector};

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Connector configuration (the pair's `connector_config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory to pull documents from
    pub root: PathBuf,
}

/// The filesystem connector.
pub struct FilesConnector {
    root: PathBuf,
}

impl FilesConnector {
    /// Build from pair configuration.
    ///
    /// # Errors
    /// Returns an error when the configuration is malformed.
    pub fn new(config: &serde_json::Value) -> Result<Self> {
        let config: FilesConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::config_with_source("invalid files connector config", e))?;
        Ok(Self { root: config.root })
    }

    fn supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }

    async fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && Self::supported(&path) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl LoadConnector for FilesConnector {
    async fn validate_connector_settings(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.root).await.map_err(|e| {
            ConnectorValidationError::Invalid(format!(
                "root directory {} is not accessible: {e}",
                self.root.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(ConnectorValidationError::Invalid(format!(
                "{} is not a directory",
                self.root.display()
            ))
            .into());
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Box<dyn ConnectorRun>> {
        let files = self.collect_files().await?;
        Ok(Box::new(FilesRun {
            root: self.root.clone(),
            files,
            position: 0,
        }))
    }
}

struct FilesRun {
    root: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
}

#[async_trait]
impl ConnectorRun for FilesRun {
    async fn next(&mut self) -> Result<Option<ConnectorItem>> {
        let Some(path) = self.files.get(self.position).cloned() else {
            return Ok(None);
        };
        self.position += 1;

        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to read file");
                return Ok(Some(ConnectorItem::Failure(ConnectorFailure::for_document(
                    format!("FILE_{relative}"),
                    None,
                    format!("failed to read file: {e}"),
                ))));
            }
        };

        let modified = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());

        Ok(Some(ConnectorItem::Document(Box::new(Document {
            id: format!("FILE_{relative}"),
            semantic_identifier: name,
            title: None,
            sections: vec![Section::Text {
                text: content,
                link: None,
            }],
            metadata: BTreeMap::new(),
            doc_updated_at: modified,
            primary_owners: None,
            secondary_owners: None,
            source: DocumentSource::Files,
            from_ingestion_api: false,
        }))))
    }

    fn checkpoint(&self) -> ConnectorCheckpoint {
        ConnectorCheckpoint {
            content: serde_json::Value::Null,
            has_more: false,
        }
    }
}
