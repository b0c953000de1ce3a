//! Domain Value Objects
//!
//! Strong-typed identifiers and the tenant context carried through every
//! core call.

mod context;
mod ids;

pub use context::TenantId;
pub use ids::{CcPairId, DocumentSetId, IndexAttemptId, SearchSettingsId, UserGroupId};
