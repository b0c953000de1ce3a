//! Per-call tenant context.

use std::sync::Arc;

use trawl_domain::ports::{KvBroker, Repositories};
use trawl_domain::value_objects::TenantId;

/// Everything a use case needs for one tenant, threaded explicitly as a
/// parameter.
///
/// Built by the tenant router at task entry; the KV handles are already
/// prefixed with the tenant, and the repositories point at the tenant's
/// schema. Cloning is cheap (all `Arc`s).
#[derive(Clone)]
pub struct TenantContext {
    /// The tenant this work runs under
    pub tenant: TenantId,
    /// Primary KV handle
    pub kv: Arc<dyn KvBroker>,
    /// Replica KV handle for scans
    pub kv_replica: Arc<dyn KvBroker>,
    /// Repository bundle against the tenant's schema
    pub repos: Repositories,
}

impl TenantContext {
    /// Build a context.
    pub fn new(
        tenant: TenantId,
        kv: Arc<dyn KvBroker>,
        kv_replica: Arc<dyn KvBroker>,
        repos: Repositories,
    ) -> Self {
        Self {
            tenant,
            kv,
            kv_replica,
            repos,
        }
    }
}
