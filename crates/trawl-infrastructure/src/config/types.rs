//! Application configuration types.

use serde::{Deserialize, Serialize};
use trawl_application::indexing::ExitCodePolicy;

/// KV broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// Broker backend: `"redis"` or `"memory"`
    #[serde(default = "default_kv_backend")]
    pub backend: String,
    /// Redis URL for the primary
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Redis URL for the read replica (defaults to the primary)
    #[serde(default)]
    pub replica_url: Option<String>,
}

fn default_kv_backend() -> String {
    "memory".to_owned()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_owned()
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: default_kv_backend(),
            url: default_redis_url(),
            replica_url: None,
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path template; `{tenant}` expands to the tenant id.
    /// `":memory:"` gives every tenant an isolated in-memory store.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    ":memory:".to_owned()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexConfig {
    /// Index backend: `"http"` or `"memory"`
    #[serde(default = "default_index_backend")]
    pub backend: String,
    /// Base URL of the index API
    #[serde(default = "default_index_url")]
    pub url: String,
}

fn default_index_backend() -> String {
    "memory".to_owned()
}

fn default_index_url() -> String {
    "http://127.0.0.1:8081".to_owned()
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: default_index_url(),
        }
    }
}

/// Inference (model server) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Embedding backend: `"http"` or `"hash"`
    #[serde(default = "default_inference_backend")]
    pub backend: String,
    /// Base URL of the model server
    #[serde(default = "default_inference_url")]
    pub url: String,
    /// Embedding dimensionality for the hash backend
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Enable the content classification model
    #[serde(default)]
    pub enable_content_classification: bool,
}

fn default_inference_backend() -> String {
    "hash".to_owned()
}

fn default_inference_url() -> String {
    "http://127.0.0.1:9000".to_owned()
}

fn default_dimensions() -> usize {
    384
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: default_inference_backend(),
            url: default_inference_url(),
            dimensions: default_dimensions(),
            enable_content_classification: false,
        }
    }
}

/// Queue worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Workers on the indexing queue
    #[serde(default = "default_indexing_workers")]
    pub indexing_workers: usize,
    /// Workers on the light doc-sync queue
    #[serde(default = "default_doc_sync_workers")]
    pub doc_sync_workers: usize,
    /// Workers on the housekeeping queue
    #[serde(default = "default_housekeeping_workers")]
    pub housekeeping_workers: usize,
}

fn default_indexing_workers() -> usize {
    2
}

fn default_doc_sync_workers() -> usize {
    8
}

fn default_housekeeping_workers() -> usize {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            indexing_workers: default_indexing_workers(),
            doc_sync_workers: default_doc_sync_workers(),
            housekeeping_workers: default_housekeeping_workers(),
        }
    }
}

/// Indexing behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Exit-code policy for the watchdog
    #[serde(default)]
    pub exit_code_policy: ExitCodePolicySetting,
    /// Keep pairs active when connector construction fails
    #[serde(default)]
    pub leave_connector_active_on_init_failure: bool,
    /// Beat period in seconds
    #[serde(default = "default_beat_period")]
    pub beat_period_secs: u64,
}

fn default_beat_period() -> u64 {
    15
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exit_code_policy: ExitCodePolicySetting::default(),
            leave_connector_active_on_init_failure: false,
            beat_period_secs: default_beat_period(),
        }
    }
}

/// Serializable mirror of [`ExitCodePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExitCodePolicySetting {
    /// Honor the child's exit code
    #[default]
    Strict,
    /// Trust a 200 completion signal over a non-zero exit
    TrustCompletion,
}

impl From<ExitCodePolicySetting> for ExitCodePolicy {
    fn from(value: ExitCodePolicySetting) -> Self {
        match value {
            ExitCodePolicySetting::Strict => Self::Strict,
            ExitCodePolicySetting::TrustCompletion => Self::TrustCompletion,
        }
    }
}

/// Sync coordinator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Coordinator beat period in seconds
    #[serde(default = "default_sync_period")]
    pub beat_period_secs: u64,
}

fn default_sync_period() -> u64 {
    20
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            beat_period_secs: default_sync_period(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Env-filter directive (e.g. `"info,trawl=debug"`)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// The whole application configuration (the `settings:` section).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Tenants this node serves; empty means just the default tenant
    #[serde(default)]
    pub tenants: Vec<String>,
    /// KV broker
    #[serde(default)]
    pub kv: KvConfig,
    /// Relational store
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Search index
    #[serde(default)]
    pub search_index: SearchIndexConfig,
    /// Inference providers
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Queue worker pools
    #[serde(default)]
    pub queue: QueueConfig,
    /// Indexing behavior
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Sync coordinator behavior
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}
