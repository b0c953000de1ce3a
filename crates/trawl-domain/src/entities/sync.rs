//! Sync bookkeeping: records, document sets, user groups.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::value_objects::{DocumentSetId, UserGroupId};

/// What kind of entity a sync pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Document-set membership propagation
    #[display("document_set")]
    DocumentSet,
    /// User-group / ACL propagation
    #[display("user_group")]
    UserGroup,
}

/// Lifecycle of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Tasks are outstanding
    #[display("in_progress")]
    InProgress,
    /// All tasks drained successfully
    #[display("success")]
    Success,
    /// The pass was abandoned with an error
    #[display("failed")]
    Failed,
    /// The pass was canceled
    #[display("canceled")]
    Canceled,
}

/// Observable record of one sync pass over one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Row id
    pub id: i64,
    /// The entity being synced (document set or user group row id)
    pub entity_id: i64,
    /// What kind of entity
    pub sync_type: SyncType,
    /// Current status
    pub status: SyncStatus,
    /// Documents synced so far (or total on completion)
    pub num_docs_synced: i64,
    /// Creation time (epoch seconds)
    pub created_at: i64,
    /// Time of the last status update (epoch seconds)
    pub updated_at: i64,
}

/// A named set of documents used for scoped search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSet {
    /// Row id
    pub id: DocumentSetId,
    /// Display name
    pub name: String,
    /// Whether the search index reflects the current membership
    pub is_up_to_date: bool,
}

/// A user group granting document access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    /// Row id
    pub id: UserGroupId,
    /// Display name
    pub name: String,
    /// Whether the search index reflects the current membership
    pub is_up_to_date: bool,
}
