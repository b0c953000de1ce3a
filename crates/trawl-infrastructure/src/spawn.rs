//! Child-process spawner for indexing attempts.
//!
//! The watchdog isolates each attempt in a spawned copy of the worker
//! binary. Everything the child needs travels as a serialized argument
//! struct on the command line; the config path rides an env var so the
//! child rebuilds its own providers.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{IndexingSpawnArgs, ProcessExit, ProcessSpawner, SpawnedProcess};

/// Subcommand the child runs (hidden from `--help`).
pub const CHILD_SUBCOMMAND: &str = "index-attempt";

/// Env var carrying the config path into the child.
pub const CONFIG_ENV_VAR: &str = "TRAWL_CONFIG";

/// Bytes of stderr kept for failure reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// [`ProcessSpawner`] over `tokio::process`.
pub struct TokioProcessSpawner {
    config_path: Option<PathBuf>,
}

impl TokioProcessSpawner {
    /// Spawner passing `config_path` to children via the env var.
    #[must_use]
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }
}

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
    async fn spawn_indexing(&self, args: &IndexingSpawnArgs) -> Result<Box<dyn SpawnedProcess>> {
        let exe = std::env::current_exe()?;
        let args_json = serde_json::to_string(args)?;

        let mut command = Command::new(exe);
        command
            .arg(CHILD_SUBCOMMAND)
            .arg("--args-json")
            .arg(args_json)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &self.config_path {
            command.env(CONFIG_ENV_VAR, path);
        }

        let child = command
            .spawn()
            .map_err(|e| Error::connector_with_source("failed to spawn indexing child", e))?;
        Ok(Box::new(SpawnedIndexingProcess { child }))
    }
}

struct SpawnedIndexingProcess {
    child: Child,
}

#[async_trait]
impl SpawnedProcess for SpawnedIndexingProcess {
    async fn try_status(&mut self) -> Result<Option<ProcessExit>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(classify_exit(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::connector_with_source("child status poll failed", e)),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| Error::connector_with_source("failed to kill child", e))
    }

    async fn stderr_tail(&mut self) -> Option<String> {
        let mut stderr = self.child.stderr.take()?;
        let mut buffer = Vec::new();
        if stderr.read_to_end(&mut buffer).await.is_err() {
            return None;
        }
        let start = buffer.len().saturating_sub(STDERR_TAIL_BYTES);
        Some(String::from_utf8_lossy(&buffer[start..]).into_owned())
    }
}

#[cfg(unix)]
fn classify_exit(status: std::process::ExitStatus) -> ProcessExit {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ProcessExit::Code(code),
        None => ProcessExit::Signal(status.signal().unwrap_or(0)),
    }
}

#[cfg(not(unix))]
fn classify_exit(status: std::process::ExitStatus) -> ProcessExit {
    ProcessExit::Code(status.code().unwrap_or(1))
}
