//! Index attempts and their failure records.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId};

/// State machine of one indexing attempt.
///
/// `NotStarted → InProgress → {Success | PartialSuccess | Failed |
/// Canceled}`. Terminal states are immutable; repositories refuse to
/// transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum IndexAttemptStatus {
    /// Created, fence open, child not yet running
    #[display("not_started")]
    NotStarted,
    /// Child is pulling and indexing
    #[display("in_progress")]
    InProgress,
    /// Finished with zero failures
    #[display("success")]
    Success,
    /// Finished with some per-document/entity failures recorded
    #[display("partial_success")]
    PartialSuccess,
    /// Aborted with an error
    #[display("failed")]
    Failed,
    /// Stopped by operator signal
    #[display("canceled")]
    Canceled,
}

impl IndexAttemptStatus {
    /// Returns `true` for terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::PartialSuccess | Self::Failed | Self::Canceled
        )
    }
}

/// One attempt to index a `(cc_pair, search_settings)` unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAttempt {
    /// Row id
    pub id: IndexAttemptId,
    /// The pair being indexed
    pub cc_pair_id: CcPairId,
    /// The index generation being written
    pub search_settings_id: SearchSettingsId,
    /// Current status
    pub status: IndexAttemptStatus,
    /// Ignore checkpoints and stored watermarks; pull everything
    pub from_beginning: bool,
    /// Poll window start (epoch seconds), set once the window is computed
    pub poll_range_start: Option<i64>,
    /// Poll window end (epoch seconds)
    pub poll_range_end: Option<i64>,
    /// Connector checkpoint JSON, persisted verbatim
    pub checkpoint_blob: Option<String>,
    /// Operator-facing failure reason
    pub error_msg: Option<String>,
    /// Full trace of the causal error, for debugging
    pub full_exception_trace: Option<String>,
    /// Documents processed by this attempt so far
    pub total_docs_indexed: i64,
    /// Documents that were new to the system
    pub new_docs_indexed: i64,
    /// Creation time (epoch seconds)
    pub created_at: i64,
    /// Time the child transitioned to in-progress (epoch seconds)
    pub started_at: Option<i64>,
    /// Time a terminal status was recorded (epoch seconds)
    pub completed_at: Option<i64>,
}

/// Parameters for creating a new attempt row.
#[derive(Debug, Clone)]
pub struct NewIndexAttempt {
    /// The pair to index
    pub cc_pair_id: CcPairId,
    /// The index generation to write
    pub search_settings_id: SearchSettingsId,
    /// Whether to ignore checkpoints and watermarks
    pub from_beginning: bool,
}

/// A document that could not be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    /// Source document id
    pub document_id: String,
    /// Link to the document, when known
    pub document_link: Option<String>,
}

/// A source-side entity (space, channel, folder) that could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFailure {
    /// Source entity id
    pub entity_id: String,
    /// Window start that was being processed, if windowed
    pub missed_time_start: Option<i64>,
    /// Window end that was being processed
    pub missed_time_end: Option<i64>,
}

/// A non-fatal failure surfaced by a connector or the pipeline.
///
/// Exactly one of `failed_document` / `failed_entity` is usually set; the
/// checkpoint progresses past the failure and the run continues unless the
/// failure threshold trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorFailure {
    /// Human-readable failure description
    pub failure_message: String,
    /// The failing document, for document-level failures
    pub failed_document: Option<DocumentFailure>,
    /// The failing entity, for entity-level failures
    pub failed_entity: Option<EntityFailure>,
}

impl ConnectorFailure {
    /// Failure for a single document.
    pub fn for_document(
        document_id: impl Into<String>,
        link: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            failure_message: message.into(),
            failed_document: Some(DocumentFailure {
                document_id: document_id.into(),
                document_link: link,
            }),
            failed_entity: None,
        }
    }

    /// Failure for a source-side entity.
    pub fn for_entity(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure_message: message.into(),
            failed_document: None,
            failed_entity: Some(EntityFailure {
                entity_id: entity_id.into(),
                missed_time_start: None,
                missed_time_end: None,
            }),
        }
    }
}

/// Durable record of a [`ConnectorFailure`], resolvable by later success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAttemptError {
    /// Row id
    pub id: i64,
    /// The attempt that recorded the failure
    pub index_attempt_id: IndexAttemptId,
    /// The pair the attempt belonged to
    pub cc_pair_id: CcPairId,
    /// Failing document id, for document-level failures
    pub document_id: Option<String>,
    /// Failing entity id, for entity-level failures
    pub entity_id: Option<String>,
    /// Failure description
    pub failure_message: String,
    /// Cleared when a later attempt successfully indexes the same target
    pub is_resolved: bool,
    /// Creation time (epoch seconds)
    pub created_at: i64,
}
