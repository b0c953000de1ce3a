//! Source documents and their sections.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The external system a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    /// Paginated HTTP wiki-style source
    #[display("wiki")]
    Wiki,
    /// Local/mounted filesystem source
    #[display("files")]
    Files,
    /// Documents pushed through the ingestion API
    #[display("ingestion_api")]
    IngestionApi,
}

/// A metadata value: single string or list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Single value
    One(String),
    /// Multiple values for the same key
    Many(Vec<String>),
}

/// One section of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    /// Plain text content
    Text {
        /// The section text (may be empty)
        text: String,
        /// Link to the section at the source
        link: Option<String>,
    },
    /// An image stored in the file store, summarized during indexing
    Image {
        /// File-store name of the image
        image_file_name: String,
        /// Link to the section at the source
        link: Option<String>,
    },
}

impl Section {
    /// The section's text content; empty for images.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::Image { .. } => "",
        }
    }

    /// The section's source link, if any.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        match self {
            Self::Text { link, .. } | Self::Image { link, .. } => link.as_deref(),
        }
    }
}

/// A document as yielded by a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source-unique id (prefixed by the factory where needed)
    pub id: String,
    /// Display identifier (title-like)
    pub semantic_identifier: String,
    /// Optional explicit title; `Some("")` means "explicitly untitled"
    pub title: Option<String>,
    /// Ordered content sections
    pub sections: Vec<Section>,
    /// Source-provided metadata tags
    pub metadata: BTreeMap<String, MetadataValue>,
    /// When the source last modified the document (epoch seconds)
    pub doc_updated_at: Option<i64>,
    /// Primary owners (emails or display names)
    pub primary_owners: Option<Vec<String>>,
    /// Secondary owners
    pub secondary_owners: Option<Vec<String>>,
    /// Originating source
    pub source: DocumentSource,
    /// Whether the doc arrived through the ingestion API
    pub from_ingestion_api: bool,
}

impl Document {
    /// Total characters across text sections (sizing guard input).
    #[must_use]
    pub fn total_char_length(&self) -> usize {
        let title_len = self
            .title
            .as_deref()
            .unwrap_or(&self.semantic_identifier)
            .len();
        title_len + self.sections.iter().map(|s| s.text().len()).sum::<usize>()
    }

    /// True when there is no title, no semantic identifier, and no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let no_title = self.title.as_deref().is_none_or(|t| t.trim().is_empty());
        no_title
            && self.semantic_identifier.trim().is_empty()
            && self.sections.iter().all(|s| s.text().trim().is_empty())
    }

    /// Compact identifier for log lines.
    #[must_use]
    pub fn short_descriptor(&self) -> String {
        format!("'{}' ({})", self.semantic_identifier, self.id)
    }
}

/// A processed section: images replaced by summaries or placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSection {
    /// Text content (image summary text for image sections)
    pub text: String,
    /// Link to the section at the source
    pub link: Option<String>,
    /// Original image file name, kept for provenance
    pub image_file_name: Option<String>,
}

/// A document plus its processed sections, ready for chunking.
///
/// Keeps both forms: raw sections for provenance, processed sections for
/// the chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingDocument {
    /// The raw document as yielded by the connector
    pub document: Document,
    /// Sections after image summarization / placeholder substitution
    pub processed_sections: Vec<ProcessedSection>,
}

impl IndexingDocument {
    /// Concatenated processed text, used for summaries and token counts.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.processed_sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Minimal `(id, permissions)` record for permission-only passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlimDocument {
    /// Source document id
    pub id: String,
    /// Opaque permission payload understood by the permission sync layer
    pub external_access: Option<serde_json::Value>,
}

/// Basic document info upserted into the relational store during prepare.
///
/// Deliberately excludes `doc_updated_at`: advancing that column is the
/// signal that indexing succeeded, and happens in the post-write
/// transaction.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    /// The pair that produced the document
    pub cc_pair_id: crate::value_objects::CcPairId,
    /// Source document id
    pub document_id: String,
    /// Display identifier
    pub semantic_identifier: String,
    /// First section link, when present
    pub first_link: Option<String>,
    /// Primary owners
    pub primary_owners: Vec<String>,
    /// Secondary owners
    pub secondary_owners: Vec<String>,
    /// Whether the doc arrived through the ingestion API
    pub from_ingestion_api: bool,
    /// Originating source
    pub source: DocumentSource,
}

/// A document row as stored in the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Source document id
    pub id: String,
    /// Display identifier
    pub semantic_identifier: String,
    /// Source-reported modification time (epoch seconds); advanced only
    /// after a successful index write
    pub doc_updated_at: Option<i64>,
    /// Our last-modified bump; drives the needs-sync queue
    pub last_modified: i64,
    /// Number of chunks currently in the search index
    pub chunk_count: Option<i64>,
    /// Ranking boost
    pub boost: i64,
    /// Hidden from search results
    pub hidden: bool,
    /// Whether document-level metadata must be re-synced to the index
    pub needs_sync: bool,
}
