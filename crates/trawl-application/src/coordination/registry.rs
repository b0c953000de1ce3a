//! Active-fence registry maintenance.

use trawl_domain::constants::keys;
use trawl_domain::error::Result;
use trawl_domain::ports::KvBroker;

/// Current registry members, read from the replica.
pub async fn registry_members(replica: &dyn KvBroker) -> Result<Vec<String>> {
    replica.smembers(keys::ACTIVE_FENCES).await
}

/// Rebuild the registry from a keyspace scan and prune dead entries.
///
/// Scans the replica for fence-shaped keys missing from the registry (a
/// migration aid for fences created before registries existed) and drops
/// registry members whose fence key no longer exists. Returns
/// `(added, removed)`.
pub async fn reconcile_registry(kv: &dyn KvBroker, replica: &dyn KvBroker) -> Result<(u64, u64)> {
    let mut added = 0u64;
    for key in replica.scan_prefix(keys::FENCE_SCAN_PREFIX).await? {
        if keys::is_fence_key(&key) && !kv.sismember(keys::ACTIVE_FENCES, &key).await? {
            tracing::warn!(fence = %key, "Adding unregistered fence to the lookup table");
            kv.sadd(keys::ACTIVE_FENCES, &key).await?;
            added += 1;
        }
    }

    let mut removed = 0u64;
    for member in replica.smembers(keys::ACTIVE_FENCES).await? {
        if !kv.exists(&member).await? {
            kv.srem(keys::ACTIVE_FENCES, &member).await?;
            removed += 1;
        }
    }
    Ok((added, removed))
}
