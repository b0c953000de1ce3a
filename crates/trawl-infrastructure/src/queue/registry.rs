//! Task name → handler registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use trawl_domain::error::Result;
use trawl_domain::value_objects::TenantId;

/// Everything a handler gets for one task execution.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    /// The dispatched task id
    pub task_id: String,
    /// Tenant the task runs under
    pub tenant: TenantId,
    /// Task-specific JSON payload
    pub payload: serde_json::Value,
}

type BoxedHandler =
    Arc<dyn Fn(TaskExecution) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry mapping task names to async handlers.
///
/// Handlers capture their own dependencies (tenant router, providers);
/// the queue driver only resolves names and invokes.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: DashMap<String, BoxedHandler>,
}

impl TaskRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a task name, replacing any previous one.
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(TaskExecution) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |execution| Box::pin(handler(execution)));
        self.handlers.insert(name.to_owned(), boxed);
    }

    /// Look up a handler by task name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoxedHandler> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered task names, for startup logging.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}
