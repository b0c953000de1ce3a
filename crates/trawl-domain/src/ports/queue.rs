//! Task queue port.
//!
//! The queue only dispatches named tasks with at-least-once delivery;
//! handlers acquire their own broker locks. State inspection exists so the
//! beat can detect fences whose tasks vanished from the queue.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value_objects::TenantId;

/// Logical queues tasks are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Heavy indexing watchdog tasks
    #[display("indexing")]
    Indexing,
    /// Light per-document sync tasks
    #[display("doc_sync")]
    DocSync,
    /// Housekeeping (checkpoint cleanup, …)
    #[display("housekeeping")]
    Housekeeping,
}

/// A task to enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Registered task name
    pub name: String,
    /// Target queue
    pub queue: QueueName,
    /// Tenant the task runs under
    pub tenant: TenantId,
    /// Task-specific JSON payload
    pub payload: serde_json::Value,
}

/// Observable state of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TaskState {
    /// Queued, not yet picked up
    #[display("pending")]
    Pending,
    /// Prefetched by a worker, not yet running
    #[display("reserved")]
    Reserved,
    /// Currently executing
    #[display("started")]
    Started,
    /// Terminal (handler returned or errored)
    #[display("ready")]
    Ready,
    /// The queue has no record of the task
    #[display("unknown")]
    Unknown,
}

impl TaskState {
    /// Whether the task is terminal.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether the queue still holds the task (pending/reserved/started).
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Reserved | Self::Started)
    }
}

/// Terminal outcome of a task, for crash diagnosis.
#[derive(Debug, Clone)]
pub struct TaskResultInfo {
    /// Whether the handler returned Ok
    pub success: bool,
    /// The handler's error rendering, when it failed
    pub error: Option<String>,
}

/// Dispatch + inspection interface of the queue driver.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task; returns its id.
    async fn dispatch(&self, submission: TaskSubmission) -> Result<String>;

    /// Current state of a task by id.
    async fn state(&self, task_id: &str) -> TaskState;

    /// Terminal outcome of a task, when it is `Ready`.
    async fn outcome(&self, task_id: &str) -> Option<TaskResultInfo>;
}
