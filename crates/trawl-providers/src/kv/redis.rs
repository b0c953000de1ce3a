//! Redis KV broker.
//!
//! Distributed backend over `redis` connection managers. Keys are
//! tenant-prefixed transparently; scans run against a dedicated replica
//! connection so scan load stays off the primary. Locks are plain
//! `SET NX PX` keys with a random token, extended and released through
//! token-guarded Lua so a lapsed owner can never touch a successor's
//! lock.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{BrokerLock, KvBroker, SetOptions};
use trawl_domain::value_objects::TenantId;

const EXTEND_SCRIPT: &str = "
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('pexpire', KEYS[1], ARGV[2])
else
  return 0
end";

const RELEASE_SCRIPT: &str = "
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
else
  return 0
end";

fn kv_err(context: &str, e: redis::RedisError) -> Error {
    Error::kv_with_source(format!("redis {context} failed"), e)
}

/// Redis-backed [`KvBroker`].
#[derive(Clone)]
pub struct RedisKvBroker {
    primary: ConnectionManager,
    replica: ConnectionManager,
    prefix: String,
}

impl RedisKvBroker {
    /// Connect primary (and optionally replica) managers for a tenant.
    ///
    /// # Errors
    /// Returns an error when either connection cannot be established.
    pub async fn connect(
        url: &str,
        replica_url: Option<&str>,
        tenant: &TenantId,
    ) -> Result<Self> {
        let primary = Self::manager(url).await?;
        let replica = match replica_url {
            Some(replica_url) if replica_url != url => Self::manager(replica_url).await?,
            _ => primary.clone(),
        };
        Ok(Self {
            primary,
            replica,
            prefix: format!("{tenant}:"),
        })
    }

    /// Re-bind this broker's connections to another tenant's namespace.
    #[must_use]
    pub fn for_tenant(&self, tenant: &TenantId) -> Self {
        Self {
            primary: self.primary.clone(),
            replica: self.replica.clone(),
            prefix: format!("{tenant}:"),
        }
    }

    async fn manager(url: &str) -> Result<ConnectionManager> {
        let client =
            redis::Client::open(url).map_err(|e| kv_err("client construction", e))?;
        client
            .get_connection_manager()
            .await
            .map_err(|e| kv_err("connect", e))
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KvBroker for RedisKvBroker {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.primary.clone();
        redis::cmd("GET")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("GET", e))
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool> {
        let mut conn = self.primary.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.scoped(key)).arg(value);
        if let Some(ttl) = opts.ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        if opts.nx {
            cmd.arg("NX");
        }
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SET", e))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.primary.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("DEL", e))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.primary.clone();
        let found: i64 = redis::cmd("EXISTS")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("EXISTS", e))?;
        Ok(found > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.primary.clone();
        redis::cmd("INCR")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("INCR", e))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.primary.clone();
        let added: i64 = redis::cmd("SADD")
            .arg(self.scoped(key))
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SADD", e))?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.primary.clone();
        let removed: i64 = redis::cmd("SREM")
            .arg(self.scoped(key))
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SREM", e))?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.primary.clone();
        redis::cmd("SMEMBERS")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SMEMBERS", e))
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.primary.clone();
        redis::cmd("SCARD")
            .arg(self.scoped(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SCARD", e))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.primary.clone();
        let found: i64 = redis::cmd("SISMEMBER")
            .arg(self.scoped(key))
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| kv_err("SISMEMBER", e))?;
        Ok(found > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.replica.clone();
        let pattern = format!("{}*", self.scoped(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(|e| kv_err("SCAN", e))?;
            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_owned)),
            );
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Result<Option<Box<dyn BrokerLock>>> {
        let token = uuid::Uuid::new_v4().to_string();
        if !self.set(name, &token, SetOptions::nx_with_ttl(ttl)).await? {
            return Ok(None);
        }
        Ok(Some(Box::new(RedisLock {
            broker: self.clone(),
            name: name.to_owned(),
            token,
            ttl,
        })))
    }
}

struct RedisLock {
    broker: RedisKvBroker,
    name: String,
    token: String,
    ttl: Duration,
}

#[async_trait]
impl BrokerLock for RedisLock {
    async fn owned(&self) -> Result<bool> {
        Ok(self.broker.get(&self.name).await?.as_deref() == Some(self.token.as_str()))
    }

    async fn reacquire(&self) -> Result<bool> {
        let mut conn = self.broker.primary.clone();
        let extended: i64 = redis::Script::new(EXTEND_SCRIPT)
            .key(self.broker.scoped(&self.name))
            .arg(&self.token)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| kv_err("lock extend", e))?;
        Ok(extended > 0)
    }

    async fn release(&self) -> Result<()> {
        let mut conn = self.broker.primary.clone();
        let _released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.broker.scoped(&self.name))
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| kv_err("lock release", e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
