//! Document access control payload carried on indexed chunks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Who may see a document.
///
/// Rendered into the search index as a flat list of ACL entries; the
/// rendering is deterministic (sorted) so re-indexing an unchanged document
/// writes identical chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAccess {
    /// Individual user emails with access
    pub user_emails: BTreeSet<String>,
    /// Internal user groups with access
    pub user_groups: BTreeSet<String>,
    /// External (source-side) user emails
    pub external_user_emails: BTreeSet<String>,
    /// External (source-side) group ids
    pub external_user_group_ids: BTreeSet<String>,
    /// Visible to everyone in the tenant
    pub is_public: bool,
}

impl DocumentAccess {
    /// Access payload granting nothing; the safe default while indexing.
    #[must_use]
    pub fn no_access() -> Self {
        Self::default()
    }

    /// Public access for a set of groups.
    #[must_use]
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Self::default()
        }
    }

    /// Flat, sorted ACL entry list for the search index.
    #[must_use]
    pub fn to_acl_entries(&self) -> Vec<String> {
        let mut entries = Vec::new();
        if self.is_public {
            entries.push("PUBLIC".to_owned());
        }
        entries.extend(self.user_emails.iter().map(|e| format!("user_email:{e}")));
        entries.extend(self.user_groups.iter().map(|g| format!("group:{g}")));
        entries.extend(
            self.external_user_emails
                .iter()
                .map(|e| format!("external_user_email:{e}")),
        );
        entries.extend(
            self.external_user_group_ids
                .iter()
                .map(|g| format!("external_group:{g}")),
        );
        entries
    }
}
