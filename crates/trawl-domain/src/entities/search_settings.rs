//! Search settings: the configuration of one index generation.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::value_objects::SearchSettingsId;

/// Migration status of an index generation.
///
/// Exactly one `Present` exists at any time; at most one `Future` (an index
/// migration being backfilled). `Past` generations are kept for history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SearchSettingsStatus {
    /// The generation queries are served from
    #[display("present")]
    Present,
    /// A new generation being built in the background
    #[display("future")]
    Future,
    /// A retired generation
    #[display("past")]
    Past,
}

/// One index generation: embedding model + index name + chunking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Row id
    pub id: SearchSettingsId,
    /// Migration status
    pub status: SearchSettingsStatus,
    /// Embedding provider type (e.g. `"remote"`, `"hash"`)
    pub provider_type: String,
    /// Embedding model name
    pub model_name: String,
    /// Embedding dimensionality
    pub dimensions: usize,
    /// Name of the search-index schema this generation writes to
    pub index_name: String,
    /// Whether large-chunk multipass indexing is enabled
    pub multipass_indexing: bool,
    /// Token budget per chunk for this generation's tokenizer
    pub chunk_token_limit: usize,
    /// Whether contextual summaries are attached to chunks
    pub enable_contextual_rag: bool,
}

impl SearchSettings {
    /// Whether this generation is the primary (query-serving) one.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.status == SearchSettingsStatus::Present
    }
}
