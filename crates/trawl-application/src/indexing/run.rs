//! The attempt driver: pull, index, record, finish.
//!
//! Runs inside the spawned child process. Owns the attempt's terminal
//! status in the relational store; errors still propagate so the child
//! can exit with the right code for the watchdog.

use std::collections::BTreeMap;
use std::sync::Arc;

use trawl_domain::constants::indexing as limits;
use trawl_domain::entities::{
    CcPairStatus, ConnectorCheckpoint, ConnectorFailure, Document, IndexAttempt,
    IndexAttemptStatus, SearchSettings, SearchSettingsStatus,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{ConnectorItem, IndexingHeartbeat};
use trawl_domain::utils::time;
use trawl_domain::value_objects::IndexAttemptId;

use super::pipeline::{IndexAttemptMetadata, IndexingPipeline, IndexingServices};
use crate::context::TenantContext;
use crate::runtime::{ConnectorRunner, strip_null_characters};

/// Consecutive failed attempts before a pair enters the repeated-error
/// state and stops being scheduled.
const REPEATED_ERROR_ATTEMPT_COUNT: usize = 3;

/// Knobs for one attempt run.
#[derive(Debug, Clone)]
pub struct RunIndexingOptions {
    /// Documents per pipeline batch
    pub batch_size: usize,
    /// Keep the pair active when the connector cannot even be constructed
    /// (useful for sources with nightly maintenance windows)
    pub leave_connector_active_on_init_failure: bool,
    /// Overlap subtracted from the window start
    pub poll_offset_secs: i64,
}

impl Default for RunIndexingOptions {
    fn default() -> Self {
        Self {
            batch_size: limits::INDEX_BATCH_SIZE,
            leave_connector_active_on_init_failure: false,
            poll_offset_secs: limits::POLL_CONNECTOR_OFFSET_SECS,
        }
    }
}

enum DriveOutcome {
    Completed,
    Stopped,
}

struct RunStats {
    batch_num: usize,
    total_failures: usize,
    net_doc_change: usize,
    document_count: usize,
    chunk_count: usize,
}

/// Run one indexing attempt end to end.
///
/// Terminal status is recorded here; the returned error (if any) is for
/// the child's exit-code classification.
pub async fn run_indexing(
    ctx: &TenantContext,
    services: &IndexingServices,
    attempt_id: IndexAttemptId,
    heartbeat: Arc<dyn IndexingHeartbeat>,
    options: &RunIndexingOptions,
) -> Result<()> {
    let attempt = ctx
        .repos
        .index_attempts
        .transition_to_in_progress(attempt_id)
        .await?;

    let settings = ctx
        .repos
        .search_settings
        .get(attempt.search_settings_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("search settings {}", attempt.search_settings_id)))?;

    let pair = ctx
        .repos
        .cc_pairs
        .get(attempt.cc_pair_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("cc_pair {}", attempt.cc_pair_id)))?;

    let is_primary = settings.status == SearchSettingsStatus::Present;

    // window computation; a failed or canceled predecessor pins the end so
    // windowed sources never skip records
    let last_successful = if attempt.from_beginning {
        0
    } else {
        ctx.repos
            .index_attempts
            .last_successful_attempt_time(attempt.cc_pair_id, attempt.search_settings_id, 0)
            .await?
    };
    let window_start = (last_successful - options.poll_offset_secs).max(0);

    let recent = ctx
        .repos
        .index_attempts
        .recent_completed(attempt.cc_pair_id, attempt.search_settings_id, 1)
        .await?;
    let window_end = match recent.first() {
        Some(prev)
            if matches!(
                prev.status,
                IndexAttemptStatus::Failed | IndexAttemptStatus::Canceled
            ) && prev.poll_range_end.is_some() =>
        {
            prev.poll_range_end.unwrap_or_else(time::epoch_secs)
        }
        _ => time::epoch_secs(),
    };
    ctx.repos
        .index_attempts
        .set_poll_range(attempt_id, window_start, window_end)
        .await?;

    let bundle = match services.connector_factory.instantiate(&pair) {
        Ok(bundle) => bundle,
        Err(e) => {
            tracing::error!(cc_pair = %pair.id, error = %e, "Unable to instantiate connector");
            if !options.leave_connector_active_on_init_failure
                && pair.status == CcPairStatus::Active
            {
                ctx.repos
                    .cc_pairs
                    .set_status(pair.id, CcPairStatus::Paused)
                    .await?;
            }
            record_failure(ctx, &attempt, is_primary, &e).await;
            return Err(e);
        }
    };

    let runner = ConnectorRunner::new(bundle, window_start, window_end);
    let checkpoint = resume_checkpoint(&runner, &attempt, recent.first(), window_end);

    let ignore_time_skip =
        attempt.from_beginning || settings.status == SearchSettingsStatus::Future;
    let pipeline = IndexingPipeline::new(
        ctx.repos.clone(),
        services,
        settings.clone(),
        ctx.tenant.clone(),
        ignore_time_skip,
        Arc::clone(&heartbeat),
    );

    let mut stats = RunStats {
        batch_num: 0,
        total_failures: 0,
        net_doc_change: 0,
        document_count: 0,
        chunk_count: 0,
    };

    let drive_result = drive(
        ctx,
        &runner,
        &pipeline,
        &attempt,
        &settings,
        checkpoint,
        heartbeat.as_ref(),
        options,
        &mut stats,
    )
    .await;

    match drive_result {
        Ok(DriveOutcome::Completed) => {
            finish_success(ctx, &attempt, is_primary, window_end, &stats).await?;
            Ok(())
        }
        Ok(DriveOutcome::Stopped) => {
            let reason = "Connector stop signal detected";
            tracing::info!(attempt = %attempt_id, "Connector run stopped by signal");
            ctx.repos
                .index_attempts
                .mark_canceled(attempt_id, reason)
                .await?;
            if is_primary {
                // net doc change still counts toward the pair
                let _ = ctx
                    .repos
                    .index_attempts
                    .update_docs_indexed(
                        attempt_id,
                        stats.document_count as i64,
                        stats.net_doc_change as i64,
                    )
                    .await;
            }
            Err(Error::connector(reason))
        }
        Err(e) => {
            tracing::error!(attempt = %attempt_id, error = %e, "Connector run exceptioned");
            record_failure(ctx, &attempt, is_primary, &e).await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    ctx: &TenantContext,
    runner: &ConnectorRunner,
    pipeline: &IndexingPipeline,
    attempt: &IndexAttempt,
    settings: &SearchSettings,
    mut checkpoint: ConnectorCheckpoint,
    heartbeat: &dyn IndexingHeartbeat,
    options: &RunIndexingOptions,
    stats: &mut RunStats,
) -> Result<DriveOutcome> {
    // unresolved failures from earlier attempts, auto-resolved on success
    let unresolved = ctx
        .repos
        .index_attempts
        .unresolved_errors(attempt.cc_pair_id)
        .await?;
    let mut doc_errors: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    let mut entity_error_ids: Vec<i64> = Vec::new();
    for row in unresolved {
        if let Some(doc_id) = row.document_id.clone() {
            doc_errors.entry(doc_id).or_default().push(row.id);
        } else if row.entity_id.is_some() {
            entity_error_ids.push(row.id);
        }
    }

    let mut last_failure: Option<ConnectorFailure> = None;

    while checkpoint.has_more {
        tracing::info!(
            attempt = %attempt.id,
            checkpoint = %checkpoint.content,
            "Running connector segment"
        );
        let mut run = runner.start_segment(checkpoint).await?;
        let mut batch: Vec<Document> = Vec::new();

        loop {
            let item = run.next().await?;
            match item {
                Some(ConnectorItem::Document(doc)) => {
                    batch.push(strip_null_characters(*doc));
                    if batch.len() >= options.batch_size {
                        if process_batch(
                            ctx,
                            pipeline,
                            attempt,
                            settings,
                            std::mem::take(&mut batch),
                            heartbeat,
                            stats,
                            &mut doc_errors,
                            &mut last_failure,
                        )
                        .await?
                            == DriveStep::Stopped
                        {
                            return Ok(DriveOutcome::Stopped);
                        }
                    }
                }
                Some(ConnectorItem::Failure(failure)) => {
                    stats.total_failures += 1;
                    last_failure = Some(failure.clone());
                    ctx.repos
                        .index_attempts
                        .create_error(attempt.id, attempt.cc_pair_id, &failure)
                        .await?;
                    check_failure_threshold(stats, last_failure.as_ref())?;
                }
                None => {
                    if !batch.is_empty()
                        && process_batch(
                            ctx,
                            pipeline,
                            attempt,
                            settings,
                            std::mem::take(&mut batch),
                            heartbeat,
                            stats,
                            &mut doc_errors,
                            &mut last_failure,
                        )
                        .await?
                            == DriveStep::Stopped
                    {
                        return Ok(DriveOutcome::Stopped);
                    }
                    break;
                }
            }
        }

        checkpoint = run.checkpoint();
        if stats.batch_num % limits::CHECKPOINT_SIZE_CHECK_INTERVAL == 0 {
            check_checkpoint_size(&checkpoint)?;
        }
        ctx.repos
            .index_attempts
            .save_checkpoint(attempt.id, &checkpoint.to_json()?)
            .await?;
    }

    // a clean run resolves outstanding entity-level failures
    if !entity_error_ids.is_empty() {
        tracing::info!(
            count = entity_error_ids.len(),
            "Resolving entity-level failures after clean run"
        );
        ctx.repos
            .index_attempts
            .resolve_errors(&entity_error_ids)
            .await?;
    }

    Ok(DriveOutcome::Completed)
}

#[derive(PartialEq, Eq)]
enum DriveStep {
    Continue,
    Stopped,
}

#[allow(clippy::too_many_arguments)]
async fn process_batch(
    ctx: &TenantContext,
    pipeline: &IndexingPipeline,
    attempt: &IndexAttempt,
    settings: &SearchSettings,
    batch: Vec<Document>,
    heartbeat: &dyn IndexingHeartbeat,
    stats: &mut RunStats,
    doc_errors: &mut BTreeMap<String, Vec<i64>>,
    last_failure: &mut Option<ConnectorFailure>,
) -> Result<DriveStep> {
    if heartbeat.should_stop() {
        return Ok(DriveStep::Stopped);
    }
    check_connector_and_attempt_status(ctx, attempt, settings).await?;

    let batch_len = batch.len();
    let batch_ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();

    stats.batch_num += 1;
    let metadata = IndexAttemptMetadata {
        cc_pair_id: attempt.cc_pair_id,
        index_attempt_id: attempt.id,
        batch_num: stats.batch_num,
    };

    let result = pipeline.index_batch_guarded(batch, &metadata).await;

    stats.net_doc_change += result.new_docs;
    stats.chunk_count += result.total_chunks;
    stats.document_count += result.total_docs;

    // resolve older failures for documents that made it this time
    let failed_ids: Vec<String> = result
        .failures
        .iter()
        .filter_map(|f| f.failed_document.as_ref().map(|d| d.document_id.clone()))
        .collect();
    let mut resolved_row_ids = Vec::new();
    for doc_id in &batch_ids {
        if !failed_ids.contains(doc_id)
            && let Some(rows) = doc_errors.remove(doc_id)
        {
            tracing::info!(doc = %doc_id, "Resolving earlier failure for re-indexed document");
            resolved_row_ids.extend(rows);
        }
    }
    if !resolved_row_ids.is_empty() {
        ctx.repos
            .index_attempts
            .resolve_errors(&resolved_row_ids)
            .await?;
    }

    if !result.failures.is_empty() {
        stats.total_failures += result.failures.len();
        for failure in &result.failures {
            ctx.repos
                .index_attempts
                .create_error(attempt.id, attempt.cc_pair_id, failure)
                .await?;
        }
        *last_failure = result.failures.last().cloned();
        check_failure_threshold(stats, last_failure.as_ref())?;
    }

    ctx.repos
        .index_attempts
        .update_docs_indexed(
            attempt.id,
            stats.document_count as i64,
            stats.net_doc_change as i64,
        )
        .await?;

    heartbeat.progress("run_indexing", batch_len as u64);
    Ok(DriveStep::Continue)
}

/// Abort the run when failures are both numerous and a large fraction of
/// the processed documents.
fn check_failure_threshold(stats: &RunStats, last_failure: Option<&ConnectorFailure>) -> Result<()> {
    let ratio = stats.total_failures as f64 / (stats.document_count.max(1)) as f64;
    if stats.total_failures > limits::FAILURE_COUNT_THRESHOLD
        && ratio > limits::FAILURE_RATIO_THRESHOLD
    {
        tracing::error!(
            failures = stats.total_failures,
            batches = stats.batch_num,
            "Connector run hit the failure threshold, aborting"
        );
        let detail = last_failure
            .map(|f| f.failure_message.clone())
            .unwrap_or_else(|| "unknown".to_owned());
        return Err(Error::connector(format!(
            "connector run encountered too many errors, aborting. Last error: {detail}"
        )));
    }
    Ok(())
}

async fn check_connector_and_attempt_status(
    ctx: &TenantContext,
    attempt: &IndexAttempt,
    settings: &SearchSettings,
) -> Result<()> {
    let pair = ctx
        .repos
        .cc_pairs
        .get(attempt.cc_pair_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("cc_pair {}", attempt.cc_pair_id)))?;

    // paused pairs still feed a FUTURE index so migrations can complete
    let paused_blocks = pair.status == CcPairStatus::Paused
        && settings.status != SearchSettingsStatus::Future;
    if paused_blocks || pair.status == CcPairStatus::Deleting {
        return Err(Error::connector("Connector was disabled mid run"));
    }

    let fresh = ctx
        .repos
        .index_attempts
        .get(attempt.id)
        .await?
        .ok_or_else(|| Error::not_found(format!("index attempt {}", attempt.id)))?;
    if fresh.status != IndexAttemptStatus::InProgress {
        return Err(Error::connector(format!(
            "Index attempt was canceled, status is {}",
            fresh.status
        )));
    }
    Ok(())
}

fn check_checkpoint_size(checkpoint: &ConnectorCheckpoint) -> Result<()> {
    let size = serde_json::to_string(&checkpoint.content)
        .map(|s| s.len())
        .unwrap_or(0);
    if size > limits::MAX_CHECKPOINT_BYTES {
        return Err(Error::connector(format!(
            "checkpoint grew too large: {size} bytes"
        )));
    }
    Ok(())
}

fn resume_checkpoint(
    runner: &ConnectorRunner,
    attempt: &IndexAttempt,
    previous: Option<&IndexAttempt>,
    window_end: i64,
) -> ConnectorCheckpoint {
    if attempt.from_beginning {
        return runner.initial_checkpoint();
    }
    let Some(prev) = previous else {
        return runner.initial_checkpoint();
    };
    let resumable = matches!(
        prev.status,
        IndexAttemptStatus::Failed | IndexAttemptStatus::Canceled
    ) && prev.poll_range_end == Some(window_end);
    if !resumable {
        return runner.initial_checkpoint();
    }
    match prev
        .checkpoint_blob
        .as_deref()
        .map(|blob| runner.validate_checkpoint_json(blob))
    {
        Some(Ok(checkpoint)) => {
            tracing::info!(
                from_attempt = %prev.id,
                "Resuming from previous attempt's checkpoint"
            );
            checkpoint
        }
        Some(Err(e)) => {
            tracing::warn!(
                from_attempt = %prev.id,
                error = %e,
                "Stored checkpoint invalid, starting fresh"
            );
            runner.initial_checkpoint()
        }
        None => runner.initial_checkpoint(),
    }
}

async fn finish_success(
    ctx: &TenantContext,
    attempt: &IndexAttempt,
    is_primary: bool,
    window_end: i64,
    stats: &RunStats,
) -> Result<()> {
    if stats.total_failures == 0 {
        ctx.repos.index_attempts.mark_succeeded(attempt.id).await?;
        tracing::info!(
            attempt = %attempt.id,
            docs = stats.document_count,
            chunks = stats.chunk_count,
            "Connector succeeded"
        );
    } else {
        ctx.repos
            .index_attempts
            .mark_partially_succeeded(attempt.id)
            .await?;
        tracing::info!(
            attempt = %attempt.id,
            failures = stats.total_failures,
            batches = stats.batch_num,
            docs = stats.document_count,
            chunks = stats.chunk_count,
            "Connector completed with some errors"
        );
    }

    if is_primary {
        ctx.repos
            .cc_pairs
            .set_last_successful_index_time(attempt.cc_pair_id, window_end)
            .await?;
        ctx.repos
            .cc_pairs
            .set_repeated_error_state(attempt.cc_pair_id, false)
            .await?;
    }
    Ok(())
}

async fn record_failure(
    ctx: &TenantContext,
    attempt: &IndexAttempt,
    is_primary: bool,
    error: &Error,
) {
    let trace = format!("{error:?}");
    if let Err(e) = ctx
        .repos
        .index_attempts
        .mark_failed(attempt.id, &error.to_string(), Some(&trace))
        .await
    {
        tracing::error!(attempt = %attempt.id, error = %e, "Failed to mark attempt failed");
    }

    if !is_primary {
        return;
    }
    // repeated failures pause scheduling for the pair until one succeeds
    match ctx
        .repos
        .index_attempts
        .recent_completed(
            attempt.cc_pair_id,
            attempt.search_settings_id,
            REPEATED_ERROR_ATTEMPT_COUNT,
        )
        .await
    {
        Ok(recent)
            if recent.len() >= REPEATED_ERROR_ATTEMPT_COUNT
                && recent
                    .iter()
                    .all(|a| a.status == IndexAttemptStatus::Failed) =>
        {
            if let Err(e) = ctx
                .repos
                .cc_pairs
                .set_repeated_error_state(attempt.cc_pair_id, true)
                .await
            {
                tracing::error!(error = %e, "Failed to flag repeated error state");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to read recent attempts");
        }
    }
}
