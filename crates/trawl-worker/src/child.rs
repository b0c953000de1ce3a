//! Child-process entrypoint for one indexing attempt.
//!
//! The watchdog spawned us with a serialized argument struct; our exit
//! code is the reporting protocol back to it. Pre-flight failures exit
//! with the coded statuses; a connector error after the run started exits
//! 255 with the attempt row already carrying the real failure reason.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use trawl_application::coordination::IndexingFence;
use trawl_application::indexing::{
    RunIndexingOptions, SignalWatcher, WatchdogTerminalStatus, run_indexing,
};
use trawl_domain::constants::{keys, timeouts};
use trawl_domain::error::Result;
use trawl_domain::ports::IndexingSpawnArgs;
use trawl_domain::utils::time;
use trawl_infrastructure::config::AppConfig;

use crate::app;

fn code(status: WatchdogTerminalStatus) -> ExitCode {
    ExitCode::from(status.code().clamp(0, 255) as u8)
}

/// Run the child; the returned exit code is read by the watchdog.
pub async fn run(config: AppConfig, config_path: Option<PathBuf>, args_json: &str) -> ExitCode {
    let args: IndexingSpawnArgs = match serde_json::from_str(args_json) {
        Ok(args) => args,
        Err(e) => {
            tracing::error!(error = %e, "Undecodable spawn arguments");
            return code(WatchdogTerminalStatus::IndexAttemptMismatch);
        }
    };

    tracing::info!(
        tenant = %args.tenant_id,
        attempt = %args.index_attempt_id,
        cc_pair = %args.cc_pair_id,
        search_settings = %args.search_settings_id,
        "Indexing spawned task starting"
    );

    match run_inner(config, config_path, &args).await {
        Ok(exit) => exit,
        Err(e) => {
            tracing::error!(
                attempt = %args.index_attempt_id,
                error = %e,
                "Indexing spawned task failed"
            );
            code(WatchdogTerminalStatus::ConnectorExceptioned)
        }
    }
}

async fn run_inner(
    config: AppConfig,
    config_path: Option<PathBuf>,
    args: &IndexingSpawnArgs,
) -> Result<ExitCode> {
    let leave_active = config.indexing.leave_connector_active_on_init_failure;
    let app = app::build(config, config_path).await?;
    let ctx = app.router.resolve(&args.tenant_id)?;

    let fence = IndexingFence::new(
        ctx.kv.clone(),
        args.cc_pair_id,
        args.search_settings_id,
    );

    // deletion and stop fences win over starting new work
    if ctx
        .kv
        .exists(&keys::ccpair_deletion_fence_key(args.cc_pair_id))
        .await?
    {
        tracing::warn!(cc_pair = %args.cc_pair_id, "Connector deletion in progress, not starting");
        return Ok(code(WatchdogTerminalStatus::BlockedByDeletion));
    }
    let stop_fence_key = keys::ccpair_stop_fence_key(args.cc_pair_id);
    if ctx.kv.exists(&stop_fence_key).await? {
        tracing::warn!(cc_pair = %args.cc_pair_id, "Connector stop signal set, not starting");
        return Ok(code(WatchdogTerminalStatus::BlockedByStopSignal));
    }

    // the beat may still be finalizing the fence payload; wait for it
    let deadline = tokio::time::Instant::now() + timeouts::FENCE_READINESS_TIMEOUT;
    let mut payload = loop {
        if tokio::time::Instant::now() > deadline {
            tracing::error!(fence = fence.fence_key(), "Timed out waiting for fence readiness");
            return Ok(code(WatchdogTerminalStatus::FenceReadinessTimeout));
        }
        if !fence.fenced().await? {
            tracing::error!(fence = fence.fence_key(), "Fence not found");
            return Ok(code(WatchdogTerminalStatus::FenceNotFound));
        }
        let Some(payload) = fence.payload().await? else {
            tracing::error!(fence = fence.fence_key(), "Fence payload invalid or missing");
            return Ok(code(WatchdogTerminalStatus::FenceNotFound));
        };
        if !payload.is_ready() {
            tracing::info!(fence = fence.fence_key(), "Waiting for fence payload");
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        if payload.index_attempt_id != Some(args.index_attempt_id) {
            tracing::error!(
                fence = fence.fence_key(),
                fence_attempt = ?payload.index_attempt_id,
                task_attempt = %args.index_attempt_id,
                "Fence/task attempt mismatch; task may be left over from a previous run"
            );
            return Ok(code(WatchdogTerminalStatus::FenceMismatch));
        }
        break payload;
    };

    // single-flight inner guard
    let Some(lock) = ctx
        .kv
        .acquire_lock(&fence.generator_lock_name(), timeouts::INDEXING_LOCK_TTL)
        .await?
    else {
        tracing::warn!(
            attempt = %args.index_attempt_id,
            "Indexing task already running, exiting"
        );
        return Ok(code(WatchdogTerminalStatus::TaskAlreadyRunning));
    };
    let lock: Arc<dyn trawl_domain::ports::BrokerLock> = Arc::from(lock);

    payload.started = Some(time::epoch_secs());
    fence.set_fence(Some(&payload)).await?;

    if ctx
        .repos
        .index_attempts
        .get(args.index_attempt_id)
        .await?
        .is_none()
    {
        tracing::error!(attempt = %args.index_attempt_id, "Index attempt not found");
        return Ok(code(WatchdogTerminalStatus::IndexAttemptMismatch));
    }
    if ctx.repos.cc_pairs.get(args.cc_pair_id).await?.is_none() {
        tracing::error!(cc_pair = %args.cc_pair_id, "cc_pair not found");
        return Ok(code(WatchdogTerminalStatus::IndexAttemptMismatch));
    }

    let watcher = SignalWatcher::spawn(
        ctx.kv.clone(),
        fence.clone(),
        stop_fence_key,
        Arc::clone(&lock),
        timeouts::WATCHDOG_POLL_PERIOD,
    );
    let heartbeat = watcher.state();

    let options = RunIndexingOptions {
        leave_connector_active_on_init_failure: leave_active,
        ..RunIndexingOptions::default()
    };
    let result = run_indexing(
        &ctx,
        &app.services,
        args.index_attempt_id,
        heartbeat,
        &options,
    )
    .await;

    watcher.shutdown();

    let exit = match result {
        Ok(()) => {
            // the completion signal is what observers trust; it MUST be
            // written before we exit successfully
            fence.set_generator_complete(200).await?;
            tracing::info!(attempt = %args.index_attempt_id, "Indexing spawned task finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(attempt = %args.index_attempt_id, error = %e, "Indexing run errored");
            code(WatchdogTerminalStatus::ConnectorExceptioned)
        }
    };

    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "Generator lock release failed");
    }
    Ok(exit)
}
