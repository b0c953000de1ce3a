//! Connector-credential pair: the unit of scheduling.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::value_objects::CcPairId;

/// Lifecycle status of a connector-credential pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CcPairStatus {
    /// Scheduled for indexing on its refresh cadence
    #[display("active")]
    Active,
    /// Not scheduled; existing documents stay searchable
    #[display("paused")]
    Paused,
    /// Deletion in progress; indexing must not start
    #[display("deleting")]
    Deleting,
}

/// Operator-requested indexing trigger, cleared once honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum IndexingTrigger {
    /// Run an incremental update as soon as possible
    #[display("update")]
    Update,
    /// Re-index from the beginning, ignoring checkpoints
    #[display("reindex")]
    Reindex,
}

/// How documents from this pair are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Visible to every user of the tenant
    #[display("public")]
    Public,
    /// Visible to the owning user only
    #[display("private")]
    Private,
    /// Permissions mirrored from the source via external-permission sync
    #[display("sync")]
    Sync,
}

/// A connector paired with a credential.
///
/// Invariant: at most one indexing attempt per
/// `(cc_pair, search_settings)` may be in progress at any moment; the
/// indexing fence plus the generator lock enforce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorCredentialPair {
    /// Row id
    pub id: CcPairId,
    /// Human-readable name
    pub name: String,
    /// Which source adapter drives this pair
    pub source: super::DocumentSource,
    /// Source-specific connector configuration
    pub connector_config: serde_json::Value,
    /// Credential material handed to the adapter
    pub credential_json: serde_json::Value,
    /// Lifecycle status
    pub status: CcPairStatus,
    /// Pending manual trigger, if any
    pub indexing_trigger: Option<IndexingTrigger>,
    /// Document exposure mode
    pub access_type: AccessType,
    /// Seconds between scheduled refreshes (`None` = manual only)
    pub refresh_freq_secs: Option<i64>,
    /// Epoch seconds of the last successful indexing run
    pub last_successful_index_time: Option<i64>,
    /// Set when consecutive attempts keep failing; pauses scheduling
    pub in_repeated_error_state: bool,
}

impl ConnectorCredentialPair {
    /// Whether the scheduler may create new attempts for this pair.
    #[must_use]
    pub fn schedulable(&self) -> bool {
        self.status == CcPairStatus::Active && !self.in_repeated_error_state
    }
}
