//! The indexing watchdog: supervises one spawned attempt.

use std::time::Duration;

use trawl_domain::error::Result;
use trawl_domain::ports::{IndexingSpawnArgs, ProcessExit, SpawnedProcess};
use trawl_domain::utils::time;

use super::pipeline::IndexingServices;
use crate::context::TenantContext;
use crate::coordination::IndexingFence;
use crate::tasks::IndexingTaskPayload;

/// The different statuses the watchdog can finish with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum WatchdogTerminalStatus {
    /// No terminal status was determined
    #[display("undefined")]
    Undefined,
    /// The attempt completed (exit 0, or trusted completion signal)
    #[display("succeeded")]
    Succeeded,
    /// The child process could not be spawned
    #[display("spawn_failed")]
    SpawnFailed,
    /// A connector deletion fence blocked the start
    #[display("blocked_by_deletion")]
    BlockedByDeletion,
    /// A connector stop fence blocked the start
    #[display("blocked_by_stop_signal")]
    BlockedByStopSignal,
    /// The fence key vanished before the child could start
    #[display("fence_not_found")]
    FenceNotFound,
    /// The fence existed but never became ready within the timeout
    #[display("fence_readiness_timeout")]
    FenceReadinessTimeout,
    /// Fence payload and task metadata disagree
    #[display("fence_mismatch")]
    FenceMismatch,
    /// Another task already holds the generator lock
    #[display("task_already_running")]
    TaskAlreadyRunning,
    /// Expected attempt metadata was missing from the relational store
    #[display("index_attempt_mismatch")]
    IndexAttemptMismatch,
    /// The connector itself errored
    #[display("connector_exceptioned")]
    ConnectorExceptioned,
    /// The watchdog itself errored
    #[display("watchdog_exceptioned")]
    WatchdogExceptioned,
    /// An operator terminate signal was honored
    #[display("terminated_by_signal")]
    TerminatedBySignal,
    /// The child was killed by SIGKILL
    #[display("process_signal_sigkill")]
    ProcessSignalSigkill,
    /// The child was OOM-killed (exit 137)
    #[display("out_of_memory")]
    OutOfMemory,
}

impl WatchdogTerminalStatus {
    /// The process exit code that encodes this status.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::ProcessSignalSigkill => -9,
            Self::OutOfMemory => 137,
            Self::BlockedByDeletion => 248,
            Self::BlockedByStopSignal => 249,
            Self::FenceNotFound => 250,
            Self::FenceReadinessTimeout => 251,
            Self::FenceMismatch => 252,
            Self::TaskAlreadyRunning => 253,
            Self::IndexAttemptMismatch => 254,
            Self::ConnectorExceptioned => 255,
            _ => 1,
        }
    }

    /// Decode a child exit code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -9 => Self::ProcessSignalSigkill,
            137 => Self::OutOfMemory,
            248 => Self::BlockedByDeletion,
            249 => Self::BlockedByStopSignal,
            250 => Self::FenceNotFound,
            251 => Self::FenceReadinessTimeout,
            252 => Self::FenceMismatch,
            253 => Self::TaskAlreadyRunning,
            254 => Self::IndexAttemptMismatch,
            255 => Self::ConnectorExceptioned,
            _ => Self::Undefined,
        }
    }
}

/// What to do when the child exits non-zero but the generator-complete
/// signal reads OK.
///
/// `Strict` honors the exit code. `TrustCompletion` reproduces the
/// workaround for managed-cluster environments where a successful child
/// occasionally exits 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitCodePolicy {
    /// Honor the exit code (default)
    #[default]
    Strict,
    /// Treat completion-signal 200 as success regardless of exit code
    TrustCompletion,
}

/// Terminal report of one watchdog run.
#[derive(Debug, Clone)]
pub struct WatchdogOutcome {
    /// How the supervision ended
    pub status: WatchdogTerminalStatus,
    /// The child's exit code, when it exited by code
    pub exit_code: Option<i32>,
    /// Stderr tail or error rendering, for the failure reason
    pub error_detail: Option<String>,
}

/// Supervisor for one indexing attempt.
pub struct IndexingWatchdog {
    policy: ExitCodePolicy,
    poll_period: Duration,
}

impl IndexingWatchdog {
    /// Build a watchdog with the configured exit-code policy.
    #[must_use]
    pub fn new(policy: ExitCodePolicy) -> Self {
        Self {
            policy,
            poll_period: trawl_domain::constants::timeouts::WATCHDOG_POLL_PERIOD,
        }
    }

    /// Override the supervision poll period (tests).
    #[must_use]
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Supervise one attempt to completion.
    ///
    /// Records the terminal status on the attempt row for every non-success
    /// path the child cannot have recorded itself.
    pub async fn run(
        &self,
        ctx: &TenantContext,
        services: &IndexingServices,
        payload: &IndexingTaskPayload,
        task_id: &str,
    ) -> Result<WatchdogOutcome> {
        let started = time::epoch_secs();
        let fence = IndexingFence::new(
            ctx.kv.clone(),
            payload.cc_pair_id,
            payload.search_settings_id,
        );

        tracing::info!(
            tenant = %ctx.tenant,
            attempt = %payload.index_attempt_id,
            cc_pair = %payload.cc_pair_id,
            search_settings = %payload.search_settings_id,
            "Indexing watchdog - starting"
        );

        let args = IndexingSpawnArgs {
            tenant_id: ctx.tenant.clone(),
            cc_pair_id: payload.cc_pair_id,
            search_settings_id: payload.search_settings_id,
            index_attempt_id: payload.index_attempt_id,
        };
        let mut child = match services.spawner.spawn_indexing(&args).await {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    attempt = %payload.index_attempt_id,
                    error = %e,
                    "Indexing watchdog - spawn failed"
                );
                return Ok(WatchdogOutcome {
                    status: WatchdogTerminalStatus::SpawnFailed,
                    exit_code: None,
                    error_detail: Some(e.to_string()),
                });
            }
        };
        tracing::info!(attempt = %payload.index_attempt_id, "Indexing watchdog - spawn succeeded");

        let outcome = loop {
            tokio::time::sleep(self.poll_period).await;

            // the watchdog heartbeat has a shorter TTL than the active signal
            fence.set_watchdog(true).await?;
            fence.set_active().await?;

            match child.try_status().await {
                Ok(Some(exit)) => {
                    break self.process_exit(&fence, exit, child.as_mut()).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        attempt = %payload.index_attempt_id,
                        error = %e,
                        "Indexing watchdog - status poll failed"
                    );
                    break WatchdogOutcome {
                        status: WatchdogTerminalStatus::WatchdogExceptioned,
                        exit_code: None,
                        error_detail: Some(e.to_string()),
                    };
                }
            }

            if fence.terminating(task_id).await? {
                tracing::warn!(
                    attempt = %payload.index_attempt_id,
                    "Indexing watchdog - termination signal detected"
                );
                child.kill().await?;
                break WatchdogOutcome {
                    status: WatchdogTerminalStatus::TerminatedBySignal,
                    exit_code: None,
                    error_detail: None,
                };
            }
        };

        self.record_outcome(ctx, payload, &outcome).await;

        let elapsed = time::epoch_secs() - started;
        tracing::info!(
            attempt = %payload.index_attempt_id,
            status = %outcome.status,
            exit_code = ?outcome.exit_code,
            elapsed,
            "Indexing watchdog - finished"
        );
        fence.set_watchdog(false).await?;
        Ok(outcome)
    }

    async fn process_exit(
        &self,
        fence: &IndexingFence,
        exit: ProcessExit,
        child: &mut dyn SpawnedProcess,
    ) -> WatchdogOutcome {
        let (status, exit_code) = match exit {
            ProcessExit::Code(0) => (WatchdogTerminalStatus::Succeeded, Some(0)),
            ProcessExit::Code(code) => (WatchdogTerminalStatus::from_code(code), Some(code)),
            ProcessExit::Signal(9) => (WatchdogTerminalStatus::ProcessSignalSigkill, Some(-9)),
            ProcessExit::Signal(sig) => (WatchdogTerminalStatus::Undefined, Some(-sig)),
        };

        if status == WatchdogTerminalStatus::Succeeded {
            return WatchdogOutcome {
                status,
                exit_code,
                error_detail: None,
            };
        }

        if self.policy == ExitCodePolicy::TrustCompletion {
            let completion = fence.get_completion().await.unwrap_or(None);
            if completion == Some(200) {
                tracing::warn!(
                    exit_code = ?exit_code,
                    "Spawned task has non-zero exit code but completion signal is OK, continuing"
                );
                return WatchdogOutcome {
                    status: WatchdogTerminalStatus::Succeeded,
                    exit_code,
                    error_detail: None,
                };
            }
        }

        let error_detail = child.stderr_tail().await;
        WatchdogOutcome {
            status,
            exit_code,
            error_detail,
        }
    }

    async fn record_outcome(
        &self,
        ctx: &TenantContext,
        payload: &IndexingTaskPayload,
        outcome: &WatchdogOutcome,
    ) {
        let result = match outcome.status {
            WatchdogTerminalStatus::Succeeded => Ok(()),
            WatchdogTerminalStatus::TerminatedBySignal => {
                ctx.repos
                    .index_attempts
                    .mark_canceled(
                        payload.index_attempt_id,
                        "Connector termination signal detected",
                    )
                    .await
            }
            WatchdogTerminalStatus::BlockedByStopSignal => {
                ctx.repos
                    .index_attempts
                    .mark_canceled(payload.index_attempt_id, "Connector stop signal detected")
                    .await
            }
            _ => {
                let reason = format!(
                    "Indexing watchdog observed failure: status={} exit_code={}{}",
                    outcome.status,
                    outcome
                        .exit_code
                        .map_or_else(|| "none".to_owned(), |c| c.to_string()),
                    outcome
                        .error_detail
                        .as_deref()
                        .map(|d| format!(" detail={d}"))
                        .unwrap_or_default(),
                );
                // no-op when the child already recorded a terminal status
                ctx.repos
                    .index_attempts
                    .mark_failed(payload.index_attempt_id, &reason, outcome.error_detail.as_deref())
                    .await
            }
        };
        if let Err(e) = result {
            tracing::error!(
                attempt = %payload.index_attempt_id,
                error = %e,
                "Indexing watchdog - transient error recording terminal status"
            );
        }
    }
}
