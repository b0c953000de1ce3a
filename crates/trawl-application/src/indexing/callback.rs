//! Heartbeat state shared between the async signal watcher and the
//! synchronous pipeline internals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use trawl_domain::ports::{BrokerLock, IndexingHeartbeat, KvBroker};

use crate::coordination::IndexingFence;

/// Thread-safe stop flag + progress accumulator.
///
/// Pipeline internals call [`IndexingHeartbeat`] methods from whatever
/// thread runs them; the watcher task drains progress into the fence
/// counter and flips the stop flag when a signal appears.
#[derive(Debug, Default)]
pub struct CallbackState {
    stop: AtomicBool,
    pending_progress: AtomicU64,
}

impl CallbackState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next safe boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Drain accumulated progress.
    pub fn take_progress(&self) -> u64 {
        self.pending_progress.swap(0, Ordering::SeqCst)
    }
}

impl IndexingHeartbeat for CallbackState {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn progress(&self, _tag: &str, amount: u64) {
        self.pending_progress.fetch_add(amount, Ordering::SeqCst);
    }
}

/// Async side task keeping an attempt's liveness signals fresh.
///
/// Every period it: flips the stop flag when the pair's stop fence
/// appears or the generator lock is lost, flushes progress to the fence
/// counter, and refreshes the active signal.
pub struct SignalWatcher {
    state: Arc<CallbackState>,
    handle: tokio::task::JoinHandle<()>,
}

impl SignalWatcher {
    /// Spawn the watcher.
    pub fn spawn(
        kv: Arc<dyn KvBroker>,
        fence: IndexingFence,
        stop_fence_key: String,
        lock: Arc<dyn BrokerLock>,
        period: Duration,
    ) -> Self {
        let state = Arc::new(CallbackState::new());
        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                match kv.exists(&stop_fence_key).await {
                    Ok(true) => {
                        tracing::warn!(fence = %stop_fence_key, "Stop fence detected");
                        shared.request_stop();
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Stop fence check failed");
                    }
                }

                match lock.reacquire().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::error!(
                            lock = lock.name(),
                            "Generator lock ownership lost, requesting stop"
                        );
                        shared.request_stop();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Generator lock reacquire failed");
                    }
                }

                let progress = shared.take_progress();
                if progress > 0
                    && let Err(e) = fence.record_progress(progress).await
                {
                    tracing::warn!(error = %e, "Progress flush failed");
                }
                if let Err(e) = fence.set_active().await {
                    tracing::warn!(error = %e, "Active signal refresh failed");
                }
            }
        });
        Self { state, handle }
    }

    /// The shared heartbeat state.
    #[must_use]
    pub fn state(&self) -> Arc<CallbackState> {
        Arc::clone(&self.state)
    }

    /// Stop the watcher task.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}
