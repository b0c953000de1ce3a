//! Configuration loader — YAML-based.
//!
//! Loads [`AppConfig`] from YAML configuration files. Application settings
//! live under the `settings:` key in `config/{env}.yaml`.
//!
//! Environment is resolved from `TRAWL_ENV` (default: `development`).

use std::env;
use std::path::{Path, PathBuf};

use trawl_domain::error::{Error, Result};

use super::AppConfig;

/// Configuration loader service.
///
/// Reads YAML config files and extracts the `settings:` section as
/// [`AppConfig`].
#[derive(Clone, Default)]
pub struct ConfigLoader {
    /// Optional explicit config file path (overrides environment resolution)
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set an explicit configuration file path (overrides env-based
    /// resolution).
    #[must_use]
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from YAML.
    ///
    /// Resolution order:
    /// 1. Explicit path (via `with_config_path`)
    /// 2. `config/{env}.local.yaml` (highest priority override)
    /// 3. `config/{env}.yaml` (standard config)
    ///
    /// # Errors
    ///
    /// Returns an error if no config file is found, parsing fails, or
    /// validation detects invalid values.
    pub fn load(&self) -> Result<AppConfig> {
        let yaml_path = self.find_yaml_config_path()?;
        tracing::info!(path = %yaml_path.display(), "Configuration loaded");

        let content = std::fs::read_to_string(&yaml_path)?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| Error::config_with_source("Failed to parse YAML config", e))?;

        let settings = yaml.get("settings").ok_or_else(|| {
            Error::ConfigMissing("No 'settings' key found in YAML configuration file".to_owned())
        })?;

        let app_config: AppConfig = serde_yaml::from_value(settings.clone()).map_err(|e| {
            Error::config_with_source("Failed to deserialize settings into AppConfig", e)
        })?;

        Self::validate_config(&app_config)?;
        Ok(app_config)
    }

    /// Built-in defaults, for deployments without a config file.
    #[must_use]
    pub fn defaults() -> AppConfig {
        AppConfig::default()
    }

    /// Get the current explicit configuration file path, if set.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    fn find_yaml_config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(Error::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let environment = env::var("TRAWL_ENV").unwrap_or_else(|_| "development".to_owned());
        let candidates = [
            PathBuf::from(format!("config/{environment}.local.yaml")),
            PathBuf::from(format!("config/{environment}.yaml")),
        ];
        for candidate in candidates {
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(Error::config(format!(
            "No config file found for environment '{environment}' (looked in config/)"
        )))
    }

    fn validate_config(config: &AppConfig) -> Result<()> {
        match config.kv.backend.as_str() {
            "redis" | "memory" => {}
            other => {
                return Err(Error::ConfigInvalid {
                    key: "kv.backend".to_owned(),
                    message: format!("unknown backend '{other}' (expected redis or memory)"),
                });
            }
        }
        match config.search_index.backend.as_str() {
            "http" | "memory" => {}
            other => {
                return Err(Error::ConfigInvalid {
                    key: "search_index.backend".to_owned(),
                    message: format!("unknown backend '{other}' (expected http or memory)"),
                });
            }
        }
        match config.inference.backend.as_str() {
            "http" | "hash" => {}
            other => {
                return Err(Error::ConfigInvalid {
                    key: "inference.backend".to_owned(),
                    message: format!("unknown backend '{other}' (expected http or hash)"),
                });
            }
        }
        if config.inference.dimensions == 0 {
            return Err(Error::ConfigInvalid {
                key: "inference.dimensions".to_owned(),
                message: "must be positive".to_owned(),
            });
        }
        if config.queue.indexing_workers == 0 || config.queue.doc_sync_workers == 0 {
            return Err(Error::ConfigInvalid {
                key: "queue".to_owned(),
                message: "worker counts must be positive".to_owned(),
            });
        }
        Ok(())
    }
}
