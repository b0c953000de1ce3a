//! Trawl worker binary.
//!
//! `serve` runs the beats and queue workers for every configured tenant.
//! The hidden `index-attempt` subcommand is the entrypoint of the child
//! process the indexing watchdog spawns; its exit code is the protocol
//! between child and watchdog.

mod app;
mod child;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trawl_infrastructure::config::{AppConfig, ConfigLoader};
use trawl_infrastructure::logging::init_logging;
use trawl_infrastructure::spawn::CONFIG_ENV_VAR;

#[derive(Parser)]
#[command(name = "trawl-worker", version, about = "Trawl ingestion & sync worker")]
struct Cli {
    /// Path to the YAML config file (defaults to config/{TRAWL_ENV}.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the beats and queue workers
    Serve,
    /// Load and validate the configuration, then exit
    ValidateConfig,
    /// Child entrypoint for one indexing attempt (spawned by watchdogs)
    #[command(name = "index-attempt", hide = true)]
    IndexAttempt {
        /// Serialized spawn arguments
        #[arg(long = "args-json")]
        args_json: String,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<(AppConfig, Option<PathBuf>)> {
    let path = explicit
        .cloned()
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));
    match &path {
        Some(path) => {
            let config = ConfigLoader::new().with_config_path(path).load()?;
            Ok((config, Some(path.clone())))
        }
        None => match ConfigLoader::new().load() {
            Ok(config) => Ok((config, None)),
            Err(e) => {
                tracing::warn!(error = %e, "No config file found, using built-in defaults");
                Ok((ConfigLoader::defaults(), None))
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, config_path) = match load_config(cli.config.as_ref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!(error = %e, "Configuration is invalid");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    match cli.command {
        Command::Serve => match app::serve(config, config_path).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "Worker exited with an error");
                ExitCode::FAILURE
            }
        },
        Command::ValidateConfig => {
            tracing::info!("Configuration OK");
            ExitCode::SUCCESS
        }
        Command::IndexAttempt { args_json } => child::run(config, config_path, &args_json).await,
    }
}
