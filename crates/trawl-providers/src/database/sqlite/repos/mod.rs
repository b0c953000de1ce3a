//! SQLite repository implementations.

mod ccpair;
mod common;
mod document;
mod document_set;
mod index_attempt;
mod search_settings;
mod sync_record;
mod user_group;

use std::sync::Arc;

use trawl_domain::ports::{DatabaseExecutor, Repositories};

pub use ccpair::SqliteCcPairRepository;
pub use document::SqliteDocumentRepository;
pub use document_set::SqliteDocumentSetRepository;
pub use index_attempt::SqliteIndexAttemptRepository;
pub use search_settings::SqliteSearchSettingsRepository;
pub use sync_record::SqliteSyncRecordRepository;
pub use user_group::SqliteUserGroupRepository;

/// Wire the full repository bundle over one executor.
#[must_use]
pub fn build_repositories(executor: Arc<dyn DatabaseExecutor>) -> Repositories {
    Repositories {
        cc_pairs: Arc::new(SqliteCcPairRepository::new(Arc::clone(&executor))),
        search_settings: Arc::new(SqliteSearchSettingsRepository::new(Arc::clone(&executor))),
        index_attempts: Arc::new(SqliteIndexAttemptRepository::new(Arc::clone(&executor))),
        documents: Arc::new(SqliteDocumentRepository::new(Arc::clone(&executor))),
        document_sets: Arc::new(SqliteDocumentSetRepository::new(Arc::clone(&executor))),
        user_groups: Some(Arc::new(SqliteUserGroupRepository::new(Arc::clone(
            &executor,
        )))),
        sync_records: Arc::new(SqliteSyncRecordRepository::new(executor)),
    }
}
