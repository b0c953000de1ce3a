//! Document-level metadata sync.

mod coordinator;
mod doc_sync;

pub use coordinator::{SyncPassStats, check_for_doc_sync};
pub use doc_sync::sync_document;
