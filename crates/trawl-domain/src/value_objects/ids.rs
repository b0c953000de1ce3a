//! Strong-typed identifiers for the scheduling entities.
//!
//! These wrap relational-store row ids. Document ids stay plain strings
//! because they are minted by the external sources, not by us.

/// Defines a strong-typed wrapper around an `i64` row id.
macro_rules! define_row_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            derive_more::Display,
            derive_more::From,
            derive_more::Into,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap an existing row id.
            #[must_use]
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw `i64` row id.
            #[must_use]
            pub fn raw(self) -> i64 {
                self.0
            }
        }
    };
}

define_row_id!(
    CcPairId,
    "Strong typed identifier for a connector-credential pair"
);
define_row_id!(
    SearchSettingsId,
    "Strong typed identifier for a search-settings generation"
);
define_row_id!(
    IndexAttemptId,
    "Strong typed identifier for an index attempt"
);
define_row_id!(DocumentSetId, "Strong typed identifier for a document set");
define_row_id!(UserGroupId, "Strong typed identifier for a user group");
