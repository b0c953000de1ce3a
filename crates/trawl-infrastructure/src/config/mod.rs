//! Configuration: typed settings + YAML loader.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    AppConfig, DatabaseConfig, ExitCodePolicySetting, IndexingConfig, InferenceConfig, KvConfig,
    LoggingConfig, QueueConfig, SearchIndexConfig, SyncConfig,
};
