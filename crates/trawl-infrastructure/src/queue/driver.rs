//! The queue driver: per-queue worker pools over tokio channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{QueueName, TaskQueue, TaskResultInfo, TaskState, TaskSubmission};

use super::registry::{TaskExecution, TaskRegistry};
use crate::config::QueueConfig;

struct QueuedTask {
    id: String,
    submission: TaskSubmission,
}

/// In-process [`TaskQueue`] implementation.
///
/// Dispatch is a channel send; execution happens on a bounded worker pool
/// per logical queue. States move `Pending → Reserved → Started → Ready`
/// and stay queryable afterwards for beat validation.
pub struct QueueDriver {
    registry: Arc<TaskRegistry>,
    states: Arc<DashMap<String, TaskState>>,
    outcomes: Arc<DashMap<String, TaskResultInfo>>,
    senders: HashMap<QueueName, mpsc::UnboundedSender<QueuedTask>>,
}

impl QueueDriver {
    /// Build the driver and spawn its worker pools.
    #[must_use]
    pub fn new(registry: Arc<TaskRegistry>, config: &QueueConfig) -> Arc<Self> {
        let states: Arc<DashMap<String, TaskState>> = Arc::new(DashMap::new());
        let outcomes: Arc<DashMap<String, TaskResultInfo>> = Arc::new(DashMap::new());
        let mut senders = HashMap::new();

        let pools = [
            (QueueName::Indexing, config.indexing_workers),
            (QueueName::DocSync, config.doc_sync_workers),
            (QueueName::Housekeeping, config.housekeeping_workers),
        ];
        for (queue, workers) in pools {
            let (tx, rx) = mpsc::unbounded_channel::<QueuedTask>();
            senders.insert(queue, tx);
            let shared_rx = Arc::new(Mutex::new(rx));
            for worker_index in 0..workers.max(1) {
                let rx = Arc::clone(&shared_rx);
                let registry = Arc::clone(&registry);
                let states = Arc::clone(&states);
                let outcomes = Arc::clone(&outcomes);
                tokio::spawn(async move {
                    worker_loop(queue, worker_index, rx, registry, states, outcomes).await;
                });
            }
        }

        Arc::new(Self {
            registry,
            states,
            outcomes,
            senders,
        })
    }

    /// Registered handler names, for startup logging.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.registry.names()
    }
}

async fn worker_loop(
    queue: QueueName,
    worker_index: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedTask>>>,
    registry: Arc<TaskRegistry>,
    states: Arc<DashMap<String, TaskState>>,
    outcomes: Arc<DashMap<String, TaskResultInfo>>,
) {
    loop {
        let task = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(task) = task else {
            // channel closed: driver dropped, worker exits
            return;
        };

        states.insert(task.id.clone(), TaskState::Reserved);
        let Some(handler) = registry.get(&task.submission.name) else {
            tracing::error!(
                queue = %queue,
                task = %task.submission.name,
                "No handler registered for task"
            );
            states.insert(task.id.clone(), TaskState::Ready);
            outcomes.insert(
                task.id,
                TaskResultInfo {
                    success: false,
                    error: Some("no handler registered".to_owned()),
                },
            );
            continue;
        };

        states.insert(task.id.clone(), TaskState::Started);
        tracing::debug!(
            queue = %queue,
            worker = worker_index,
            task = %task.submission.name,
            task_id = %task.id,
            "Task started"
        );

        let execution = TaskExecution {
            task_id: task.id.clone(),
            tenant: task.submission.tenant.clone(),
            payload: task.submission.payload.clone(),
        };
        let outcome = match handler(execution).await {
            Ok(()) => TaskResultInfo {
                success: true,
                error: None,
            },
            Err(e) => {
                tracing::error!(
                    queue = %queue,
                    task = %task.submission.name,
                    task_id = %task.id,
                    error = %e,
                    "Task failed"
                );
                TaskResultInfo {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };
        states.insert(task.id.clone(), TaskState::Ready);
        outcomes.insert(task.id, outcome);
    }
}

#[async_trait]
impl TaskQueue for QueueDriver {
    async fn dispatch(&self, submission: TaskSubmission) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let sender = self
            .senders
            .get(&submission.queue)
            .ok_or_else(|| Error::internal(format!("no queue named {}", submission.queue)))?;
        self.states.insert(id.clone(), TaskState::Pending);
        sender
            .send(QueuedTask {
                id: id.clone(),
                submission,
            })
            .map_err(|_| Error::internal("queue workers are gone"))?;
        Ok(id)
    }

    async fn state(&self, task_id: &str) -> TaskState {
        self.states
            .get(task_id)
            .map_or(TaskState::Unknown, |entry| *entry.value())
    }

    async fn outcome(&self, task_id: &str) -> Option<TaskResultInfo> {
        self.outcomes.get(task_id).map(|entry| entry.value().clone())
    }
}
