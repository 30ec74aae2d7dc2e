//! The authenticated principal handed to request handlers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tenantgate_directory::{TenantId, TenantRecord};

use crate::jwt::IdTokenClaims;

/// Authority granted to every verified tenant user.
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// A verified identity, bound to the tenant whose issuer signed it.
///
/// Only [`TokenVerifier`](crate::TokenVerifier) constructs contexts, so
/// holding one means the token passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantIdentityContext {
    tenant_id: TenantId,
    provider_pool_id: String,
    username: Option<String>,
    claims: IdTokenClaims,
    authorities: BTreeSet<String>,
}

impl TenantIdentityContext {
    pub(crate) fn new(record: &TenantRecord, username: Option<String>, claims: IdTokenClaims) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            provider_pool_id: record.provider_pool_id.clone(),
            username,
            claims,
            authorities: BTreeSet::from([ROLE_ADMIN.to_owned()]),
        }
    }

    /// The tenant the identity belongs to.
    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// The identity provider pool that issued the token.
    #[must_use]
    pub fn provider_pool_id(&self) -> &str {
        &self.provider_pool_id
    }

    /// The username claim, when present.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    /// The `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claims.issuer()
    }

    /// When the token expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }

    /// A raw claim value.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// All verified claims.
    #[must_use]
    pub fn claims(&self) -> &IdTokenClaims {
        &self.claims
    }

    /// Granted authorities.
    #[must_use]
    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }

    /// Whether `authority` is granted.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// Namespaces a shared resource name by tenant: `"{prefix}-{tenant_id}"`.
    ///
    /// Keeps per-tenant data such as table or bucket names apart.
    #[must_use]
    pub fn scoped_key(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.tenant_id)
    }
}
