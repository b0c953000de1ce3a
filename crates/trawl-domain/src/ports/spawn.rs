//! Child-process spawner port.
//!
//! Indexing attempts run in a dedicated child process so native crashes
//! are isolated and hard termination is possible. Everything the child
//! needs travels in a serialized argument struct — no inherited state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId, TenantId};

/// Serialized arguments for one spawned indexing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSpawnArgs {
    /// Tenant the attempt runs under
    pub tenant_id: TenantId,
    /// The pair being indexed
    pub cc_pair_id: CcPairId,
    /// The index generation being written
    pub search_settings_id: SearchSettingsId,
    /// The attempt row
    pub index_attempt_id: IndexAttemptId,
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited with a code
    Code(i32),
    /// Killed by a signal (negative-exit convention: SIGKILL = 9)
    Signal(i32),
}

/// Handle to a running child process.
#[async_trait]
pub trait SpawnedProcess: Send {
    /// Non-blocking status check; `None` while still running.
    async fn try_status(&mut self) -> Result<Option<ProcessExit>>;

    /// Hard-terminate the child.
    async fn kill(&mut self) -> Result<()>;

    /// Captured tail of the child's stderr, for failure reports.
    async fn stderr_tail(&mut self) -> Option<String>;
}

/// Spawner of indexing children.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn the indexing entrypoint with the serialized arguments.
    async fn spawn_indexing(&self, args: &IndexingSpawnArgs) -> Result<Box<dyn SpawnedProcess>>;
}
