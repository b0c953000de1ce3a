//! KV broker port.
//!
//! Thin typed wrapper over a key/value store with atomic counters, sets,
//! TTL'd string keys and advisory locks. Implementations inject the tenant
//! prefix transparently, so every key in this crate is logical.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Options for [`KvBroker::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Expire the key after this duration
    pub ttl: Option<Duration>,
    /// Only set when the key does not already exist
    pub nx: bool,
}

impl SetOptions {
    /// Set with a TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            nx: false,
        }
    }

    /// Set only if absent, with a TTL.
    #[must_use]
    pub fn nx_with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            nx: true,
        }
    }
}

/// An owned advisory lock handle.
///
/// Ownership can lapse silently when the TTL elapses without `reacquire`;
/// callers MUST check [`BrokerLock::owned`] before acting on shared state.
#[async_trait]
pub trait BrokerLock: Send + Sync {
    /// Whether this handle still owns the lock.
    async fn owned(&self) -> Result<bool>;

    /// Extend the TTL; returns `false` when ownership was already lost.
    async fn reacquire(&self) -> Result<bool>;

    /// Release the lock. No-op when not owned.
    async fn release(&self) -> Result<()>;

    /// Lock name (logical key).
    fn name(&self) -> &str;
}

/// Tenant-scoped key/value broker.
#[async_trait]
pub trait KvBroker: Send + Sync {
    /// Get a string key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string key; returns `false` when `nx` was requested and the
    /// key already existed.
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool>;

    /// Delete a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically increment an integer key, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Add a member to a set; returns whether it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set; returns whether it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Cardinality of a set.
    async fn scard(&self, key: &str) -> Result<u64>;

    /// Whether a member is in a set.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// All keys under a logical prefix.
    ///
    /// Routed to the replica handle by implementations so scan load stays
    /// off the primary.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Try to acquire an advisory lock (non-blocking).
    ///
    /// Returns `None` when the lock is already held elsewhere.
    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Result<Option<Box<dyn BrokerLock>>>;
}
