//! In-memory KV broker.
//!
//! Deterministic single-process backend with the same semantics as the
//! Redis provider: TTL'd string keys, sets, and token-owned locks. TTLs
//! expire lazily on access.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use trawl_domain::error::Result;
use trawl_domain::ports::{BrokerLock, KvBroker, SetOptions};
use trawl_domain::value_objects::TenantId;

#[derive(Clone)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Shared backing store; one per process, shared by every tenant handle.
#[derive(Default)]
pub struct MemoryKvState {
    strings: DashMap<String, StringEntry>,
    sets: DashMap<String, BTreeSet<String>>,
}

impl MemoryKvState {
    /// Fresh shared state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let entry = self.strings.get(key)?;
        if entry.live() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.strings.remove(key);
            None
        }
    }
}

/// Tenant-scoped handle over a [`MemoryKvState`].
#[derive(Clone)]
pub struct MemoryKvBroker {
    state: Arc<MemoryKvState>,
    prefix: String,
}

impl MemoryKvBroker {
    /// Handle bound to a tenant over shared state.
    #[must_use]
    pub fn new(state: Arc<MemoryKvState>, tenant: &TenantId) -> Self {
        Self {
            state,
            prefix: format!("{tenant}:"),
        }
    }

    /// Standalone broker with its own private state (tests).
    #[must_use]
    pub fn standalone(tenant: &TenantId) -> Self {
        Self::new(MemoryKvState::new(), tenant)
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KvBroker for MemoryKvBroker {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.get_live(&self.scoped(key)))
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool> {
        let scoped = self.scoped(key);
        if opts.nx && self.state.get_live(&scoped).is_some() {
            return Ok(false);
        }
        self.state.strings.insert(
            scoped,
            StringEntry {
                value: value.to_owned(),
                expires_at: opts.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let scoped = self.scoped(key);
        let had_string = self.state.strings.remove(&scoped).is_some();
        let had_set = self.state.sets.remove(&scoped).is_some();
        Ok(had_string || had_set)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let scoped = self.scoped(key);
        Ok(self.state.get_live(&scoped).is_some() || self.state.sets.contains_key(&scoped))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let scoped = self.scoped(key);
        let mut entry = self.state.strings.entry(scoped).or_insert(StringEntry {
            value: "0".to_owned(),
            expires_at: None,
        });
        let current: i64 = if entry.live() {
            entry.value.parse().unwrap_or(0)
        } else {
            0
        };
        let next = current + 1;
        entry.value = next.to_string();
        entry.expires_at = None;
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut set = self.state.sets.entry(self.scoped(key)).or_default();
        Ok(set.insert(member.to_owned()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let scoped = self.scoped(key);
        let Some(mut set) = self.state.sets.get_mut(&scoped) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        let empty = set.is_empty();
        drop(set);
        if empty {
            self.state.sets.remove_if(&scoped, |_, s| s.is_empty());
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .sets
            .get(&self.scoped(key))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self
            .state
            .sets
            .get(&self.scoped(key))
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .state
            .sets
            .get(&self.scoped(key))
            .is_some_and(|set| set.contains(member)))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let scoped_prefix = self.scoped(prefix);
        let mut out: Vec<String> = Vec::new();
        for entry in self.state.strings.iter() {
            if entry.key().starts_with(&scoped_prefix) && entry.value().live() {
                out.push(entry.key()[self.prefix.len()..].to_owned());
            }
        }
        for entry in self.state.sets.iter() {
            if entry.key().starts_with(&scoped_prefix) {
                out.push(entry.key()[self.prefix.len()..].to_owned());
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Result<Option<Box<dyn BrokerLock>>> {
        let token = uuid::Uuid::new_v4().to_string();
        if !self
            .set(name, &token, SetOptions::nx_with_ttl(ttl))
            .await?
        {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryLock {
            broker: self.clone(),
            name: name.to_owned(),
            token,
            ttl,
        })))
    }
}

struct MemoryLock {
    broker: MemoryKvBroker,
    name: String,
    token: String,
    ttl: Duration,
}

#[async_trait]
impl BrokerLock for MemoryLock {
    async fn owned(&self) -> Result<bool> {
        Ok(self.broker.get(&self.name).await?.as_deref() == Some(self.token.as_str()))
    }

    async fn reacquire(&self) -> Result<bool> {
        if !self.owned().await? {
            return Ok(false);
        }
        self.broker
            .set(&self.name, &self.token, SetOptions::with_ttl(self.ttl))
            .await?;
        Ok(true)
    }

    async fn release(&self) -> Result<()> {
        if self.owned().await? {
            self.broker.delete(&self.name).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
