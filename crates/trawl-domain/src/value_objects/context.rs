//! Tenant identity.
//!
//! Every KV key and every relational schema is scoped to a tenant. The id
//! is threaded explicitly through the core as part of the per-call context
//! built by the tenant router; there is no ambient tenant state.

use serde::{Deserialize, Serialize};

/// Opaque tenant identifier.
///
/// Provisioning mints these; the core only reads them. The default tenant
/// is used by single-tenant deployments.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct TenantId(String);

/// Tenant id used when multi-tenancy is not enabled.
pub const DEFAULT_TENANT: &str = "public";

impl TenantId {
    /// Wrap an existing tenant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw tenant string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self(DEFAULT_TENANT.to_owned())
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
