//! Domain Ports
//!
//! Interfaces the application layer depends on; implementations live in
//! the infrastructure and provider crates and are injected as
//! `Arc<dyn Trait>` bundles by the tenant router.

mod connector;
mod database;
mod heartbeat;
mod inference;
mod kv;
mod queue;
mod repositories;
mod search_index;
mod spawn;

pub use connector::{
    CheckpointedConnector, ConnectorBundle, ConnectorFactory, ConnectorItem, ConnectorRun,
    LoadConnector, PollConnector, SlimConnector,
};
pub use database::{DatabaseExecutor, SqlParam, SqlRow, SqlStatement};
pub use heartbeat::{IndexingHeartbeat, NoopHeartbeat};
pub use inference::{
    ContentClassifier, EmbedTextKind, EmbeddingProvider, TextGenerator, VisionProvider,
};
pub use kv::{BrokerLock, KvBroker, SetOptions};
pub use queue::{QueueName, TaskQueue, TaskResultInfo, TaskState, TaskSubmission};
pub use repositories::{
    CcPairRepository, DocumentLockGuard, DocumentRepository, DocumentSetRepository,
    IndexAttemptRepository, Repositories, SearchSettingsRepository, SyncRecordRepository,
    UserGroupRepository,
};
pub use search_index::{
    DocumentIndexFields, IndexBatchParams, IndexBatchResponse, InsertionRecord, SearchIndexProvider,
};
pub use spawn::{IndexingSpawnArgs, ProcessExit, ProcessSpawner, SpawnedProcess};
