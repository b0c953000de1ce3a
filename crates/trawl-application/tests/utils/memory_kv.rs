//! In-memory KV broker implementing the full domain port.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use trawl_domain::error::Result;
use trawl_domain::ports::{BrokerLock, KvBroker, SetOptions};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Default)]
struct State {
    strings: DashMap<String, Entry>,
    sets: DashMap<String, BTreeSet<String>>,
}

/// Deterministic in-memory [`KvBroker`] with TTLs and token locks.
///
/// Cloning shares the underlying store, so a cloned handle plays the role
/// of the replica.
#[derive(Clone, Default)]
pub struct MemoryKv {
    state: Arc<State>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let entry = self.state.strings.get(key)?;
        if entry.live() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.state.strings.remove(key);
            None
        }
    }
}

#[async_trait]
impl KvBroker for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_live(key))
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool> {
        if opts.nx && self.get_live(key).is_some() {
            return Ok(false);
        }
        self.state.strings.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: opts.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let had_string = self.state.strings.remove(key).is_some();
        let had_set = self.state.sets.remove(key).is_some();
        Ok(had_string || had_set)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get_live(key).is_some() || self.state.sets.contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entry = self.state.strings.entry(key.to_owned()).or_insert(Entry {
            value: "0".to_owned(),
            expires_at: None,
        });
        let next = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .state
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .state
            .sets
            .get_mut(key)
            .is_some_and(|mut set| set.remove(member)))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self
            .state
            .sets
            .get(key)
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .state
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .state
            .strings
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().live())
            .map(|e| e.key().clone())
            .collect();
        out.extend(
            self.state
                .sets
                .iter()
                .filter(|e| e.key().starts_with(prefix))
                .map(|e| e.key().clone()),
        );
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Result<Option<Box<dyn BrokerLock>>> {
        let token = uuid::Uuid::new_v4().to_string();
        if !self.set(name, &token, SetOptions::nx_with_ttl(ttl)).await? {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryLock {
            kv: self.clone(),
            name: name.to_owned(),
            token,
            ttl,
        })))
    }
}

struct MemoryLock {
    kv: MemoryKv,
    name: String,
    token: String,
    ttl: Duration,
}

#[async_trait]
impl BrokerLock for MemoryLock {
    async fn owned(&self) -> Result<bool> {
        Ok(self.kv.get_live(&self.name).as_deref() == Some(self.token.as_str()))
    }

    async fn reacquire(&self) -> Result<bool> {
        if !self.owned().await? {
            return Ok(false);
        }
        self.kv
            .set(&self.name, &self.token, SetOptions::with_ttl(self.ttl))
            .await?;
        Ok(true)
    }

    async fn release(&self) -> Result<()> {
        if self.owned().await? {
            self.kv.delete(&self.name).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
