//! Tenant router.
//!
//! Binds KV namespaces and relational schemas to units of work. Task
//! handlers and beats resolve their [`TenantContext`] here at entry and
//! thread it explicitly; nothing tenant-scoped lives in globals.

use dashmap::DashMap;
use trawl_application::context::TenantContext;
use trawl_domain::error::{Error, Result};
use trawl_domain::value_objects::TenantId;

/// Registry of the tenants this node serves.
#[derive(Default)]
pub struct TenantRouter {
    tenants: DashMap<TenantId, TenantContext>,
}

impl TenantRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant's context (replaces any previous binding).
    pub fn register(&self, context: TenantContext) {
        self.tenants.insert(context.tenant.clone(), context);
    }

    /// Resolve the context for a tenant.
    ///
    /// # Errors
    /// Returns an error for tenants this node does not serve.
    pub fn resolve(&self, tenant: &TenantId) -> Result<TenantContext> {
        self.tenants
            .get(tenant)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(format!("tenant {tenant}")))
    }

    /// Contexts of every registered tenant, for beat fan-out.
    #[must_use]
    pub fn all(&self) -> Vec<TenantContext> {
        self.tenants.iter().map(|e| e.value().clone()).collect()
    }
}
