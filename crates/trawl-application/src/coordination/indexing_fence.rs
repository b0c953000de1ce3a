//! Indexing fence: one per `(cc_pair, search_settings)` work unit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trawl_domain::constants::{keys, timeouts};
use trawl_domain::error::Result;
use trawl_domain::ports::{KvBroker, SetOptions};
use trawl_domain::utils::time;
use trawl_domain::value_objects::{CcPairId, IndexAttemptId, SearchSettingsId};

/// JSON payload stored in the indexing fence key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingFencePayload {
    /// When the beat opened the fence (epoch seconds)
    pub submitted: i64,
    /// When the child actually started pulling (epoch seconds)
    pub started: Option<i64>,
    /// The attempt row this fence belongs to
    pub index_attempt_id: Option<IndexAttemptId>,
    /// The watchdog task id, once dispatched
    pub task_id: Option<String>,
}

impl IndexingFencePayload {
    /// Fresh payload stamped with the current time.
    #[must_use]
    pub fn submitted_now(index_attempt_id: IndexAttemptId) -> Self {
        Self {
            submitted: time::epoch_secs(),
            started: None,
            index_attempt_id: Some(index_attempt_id),
            task_id: None,
        }
    }

    /// Whether both the attempt id and the task id are populated.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.index_attempt_id.is_some() && self.task_id.is_some()
    }
}

/// Handle to the fence and side keys of one indexing work unit.
#[derive(Clone)]
pub struct IndexingFence {
    kv: Arc<dyn KvBroker>,
    cc_pair: CcPairId,
    search_settings: SearchSettingsId,
    fence_key: String,
}

impl IndexingFence {
    /// Bind a fence handle for one work unit.
    pub fn new(kv: Arc<dyn KvBroker>, cc_pair: CcPairId, search_settings: SearchSettingsId) -> Self {
        let fence_key = keys::indexing_fence_key(cc_pair, search_settings);
        Self {
            kv,
            cc_pair,
            search_settings,
            fence_key,
        }
    }

    /// The fence key.
    #[must_use]
    pub fn fence_key(&self) -> &str {
        &self.fence_key
    }

    /// The generator lock name for this unit.
    #[must_use]
    pub fn generator_lock_name(&self) -> String {
        keys::indexing_generator_lock(self.cc_pair, self.search_settings)
    }

    /// Whether the fence key exists.
    pub async fn fenced(&self) -> Result<bool> {
        self.kv.exists(&self.fence_key).await
    }

    /// Decode the fence payload; `None` when unfenced or undecodable.
    pub async fn payload(&self) -> Result<Option<IndexingFencePayload>> {
        let Some(raw) = self.kv.get(&self.fence_key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                tracing::warn!(
                    fence = %self.fence_key,
                    error = %e,
                    "Undecodable indexing fence payload"
                );
                Ok(None)
            }
        }
    }

    /// Create or update the fence, or delete it with `None`.
    ///
    /// Creation adds the fence to the active registry; deletion removes it
    /// before returning.
    pub async fn set_fence(&self, payload: Option<&IndexingFencePayload>) -> Result<()> {
        match payload {
            Some(p) => {
                let raw = serde_json::to_string(p)?;
                self.kv
                    .set(&self.fence_key, &raw, SetOptions::default())
                    .await?;
                self.kv.sadd(keys::ACTIVE_FENCES, &self.fence_key).await?;
            }
            None => {
                self.kv.srem(keys::ACTIVE_FENCES, &self.fence_key).await?;
                self.kv.delete(&self.fence_key).await?;
            }
        }
        Ok(())
    }

    /// Producer-side terminal signal (HTTP-like status code).
    pub async fn set_generator_complete(&self, status: u16) -> Result<()> {
        let key = keys::indexing_generator_complete_key(self.cc_pair, self.search_settings);
        self.kv
            .set(&key, &status.to_string(), SetOptions::default())
            .await?;
        Ok(())
    }

    /// Read the producer's terminal signal.
    pub async fn get_completion(&self) -> Result<Option<u16>> {
        let key = keys::indexing_generator_complete_key(self.cc_pair, self.search_settings);
        Ok(self
            .kv
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<u16>().ok()))
    }

    /// Refresh the medium-TTL active signal.
    pub async fn set_active(&self) -> Result<()> {
        let key = keys::indexing_active_key(self.cc_pair, self.search_settings);
        self.kv
            .set(&key, "1", SetOptions::with_ttl(timeouts::ACTIVE_SIGNAL_TTL))
            .await?;
        Ok(())
    }

    /// Whether the active signal is still live.
    pub async fn active(&self) -> Result<bool> {
        let key = keys::indexing_active_key(self.cc_pair, self.search_settings);
        self.kv.exists(&key).await
    }

    /// Set or clear the short-TTL watchdog heartbeat.
    pub async fn set_watchdog(&self, alive: bool) -> Result<()> {
        let key = keys::indexing_watchdog_key(self.cc_pair, self.search_settings);
        if alive {
            self.kv
                .set(&key, "1", SetOptions::with_ttl(timeouts::WATCHDOG_ALIVE_TTL))
                .await?;
        } else {
            self.kv.delete(&key).await?;
        }
        Ok(())
    }

    /// Whether a watchdog currently claims this unit.
    pub async fn watchdog_signaled(&self) -> Result<bool> {
        let key = keys::indexing_watchdog_key(self.cc_pair, self.search_settings);
        self.kv.exists(&key).await
    }

    /// Request termination of the watchdog task with the given id.
    pub async fn set_terminate(&self, task_id: &str) -> Result<()> {
        let key = keys::indexing_terminate_key(self.cc_pair, self.search_settings, task_id);
        self.kv
            .set(&key, "1", SetOptions::with_ttl(timeouts::TERMINATE_TTL))
            .await?;
        Ok(())
    }

    /// Whether termination was requested for the given task id.
    ///
    /// Consumes the signal when present so a stale key cannot kill a
    /// later attempt.
    pub async fn terminating(&self, task_id: &str) -> Result<bool> {
        let key = keys::indexing_terminate_key(self.cc_pair, self.search_settings, task_id);
        if self.kv.exists(&key).await? {
            self.kv.delete(&key).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Bump the progress counter by `amount`.
    pub async fn record_progress(&self, amount: u64) -> Result<()> {
        let key = keys::indexing_progress_key(self.cc_pair, self.search_settings);
        let mut remaining = amount;
        while remaining > 0 {
            self.kv.incr(&key).await?;
            remaining -= 1;
        }
        Ok(())
    }

    /// Read the progress counter.
    pub async fn get_progress(&self) -> Result<Option<i64>> {
        let key = keys::indexing_progress_key(self.cc_pair, self.search_settings);
        Ok(self
            .kv
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok()))
    }

    /// Tear down the fence and every side key, and drop the registry entry.
    pub async fn reset(&self) -> Result<()> {
        self.kv.srem(keys::ACTIVE_FENCES, &self.fence_key).await?;
        self.kv
            .delete(&keys::indexing_generator_complete_key(
                self.cc_pair,
                self.search_settings,
            ))
            .await?;
        self.kv
            .delete(&keys::indexing_taskset_key(
                self.cc_pair,
                self.search_settings,
            ))
            .await?;
        self.kv
            .delete(&keys::indexing_progress_key(
                self.cc_pair,
                self.search_settings,
            ))
            .await?;
        self.kv
            .delete(&keys::indexing_active_key(
                self.cc_pair,
                self.search_settings,
            ))
            .await?;
        self.kv.delete(&self.fence_key).await?;
        Ok(())
    }
}
