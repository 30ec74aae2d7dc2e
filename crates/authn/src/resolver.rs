//! Tenant resolution from request metadata.
//!
//! A tenant is addressed either by the first DNS label of the browser's
//! `Origin` (`https://acme.example.com` belongs to `acme`) or by a claim of
//! the presented token. Neither source is trusted: the resolved tenant only
//! selects whose issuer and keys the token is then verified against.

use tenantgate_directory::TenantId;
use thiserror::Error;
use url::{Host, Url};

use crate::{config::AuthnConfig, error::AuthError, jwt::decode_unverified_claims};

/// Why no tenant could be derived from an origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum UnresolvedReason {
    /// The request carried no origin.
    #[error("no origin")]
    MissingOrigin,

    /// The origin is local and no development fallback is configured.
    #[error("local origin {0} without a development fallback tenant")]
    LocalOrigin(String),

    /// The origin is not a URL.
    #[error("origin is not a valid URL: {0}")]
    InvalidOrigin(String),

    /// The origin has no DNS host to take a label from.
    #[error("origin {0} has no DNS host")]
    NoHost(String),

    /// The first host label is not a valid tenant id.
    #[error("host label '{label}' is not a tenant id: {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Outcome of resolving a tenant from an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The origin names this tenant.
    Resolved(TenantId),
    /// No tenant could be derived.
    Unresolved(UnresolvedReason),
}

impl Resolution {
    /// Converts the outcome into a result, mapping
    /// [`Unresolved`](Self::Unresolved) to [`AuthError::UnresolvedTenant`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnresolvedTenant`] for an unresolved outcome.
    pub fn into_result(self) -> Result<TenantId, AuthError> {
        match self {
            Self::Resolved(tenant_id) => Ok(tenant_id),
            Self::Unresolved(reason) => Err(AuthError::unresolved_tenant(reason.to_string())),
        }
    }

    /// Returns the resolved tenant, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            Self::Resolved(tenant_id) => Some(tenant_id),
            Self::Unresolved(_) => None,
        }
    }
}

/// Derives the tenant id of a company name, as assigned at onboarding.
///
/// ```
/// use tenantgate_authn::resolver::derive_tenant_id;
///
/// assert_eq!(derive_tenant_id("Acme Corp!").as_deref(), Some("acmecorp"));
/// ```
#[must_use]
pub fn derive_tenant_id(company_name: &str) -> Option<String> {
    TenantId::derive_from_company_name(company_name).map(String::from)
}

/// Maps origins and token claims to tenant ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolver {
    tenant_claim: String,
    dev_fallback_tenant_host: Option<String>,
    local_origins: Vec<String>,
}

impl TenantResolver {
    /// Creates a resolver from `config`.
    #[must_use]
    pub fn new(config: &AuthnConfig) -> Self {
        Self {
            tenant_claim: config.tenant_claim().to_owned(),
            dev_fallback_tenant_host: config.dev_fallback_tenant_host().map(str::to_ascii_lowercase),
            local_origins: config.local_origins().to_vec(),
        }
    }

    /// Resolves the tenant addressed by a request's `Origin`.
    ///
    /// Missing and local origins (`localhost` or a loopback address on any
    /// port, or one of the configured local origins) resolve through the
    /// development fallback host when one is configured and are unresolved
    /// otherwise. Every unresolved outcome is logged.
    #[must_use]
    pub fn resolve_origin(&self, origin: Option<&str>) -> Resolution {
        let resolution = self.resolve_origin_inner(origin);
        if let Resolution::Unresolved(reason) = &resolution {
            tracing::warn!(origin = origin.unwrap_or_default(), %reason, "Tenant not resolved from origin");
        }
        resolution
    }

    fn resolve_origin_inner(&self, origin: Option<&str>) -> Resolution {
        let Some(origin) = origin.map(str::trim).filter(|o| !o.is_empty()) else {
            return match &self.dev_fallback_tenant_host {
                Some(host) => first_label_tenant(host),
                None => Resolution::Unresolved(UnresolvedReason::MissingOrigin),
            };
        };

        let url = match Url::parse(origin) {
            Ok(url) => url,
            Err(e) => {
                return Resolution::Unresolved(UnresolvedReason::InvalidOrigin(format!(
                    "{origin}: {e}"
                )));
            },
        };

        if self.is_local(origin, &url) {
            return match &self.dev_fallback_tenant_host {
                Some(host) => {
                    tracing::debug!(origin, host, "Local origin mapped to fallback host");
                    first_label_tenant(host)
                },
                None => Resolution::Unresolved(UnresolvedReason::LocalOrigin(origin.to_owned())),
            };
        }

        match url.host() {
            Some(Host::Domain(domain)) => first_label_tenant(domain),
            _ => Resolution::Unresolved(UnresolvedReason::NoHost(origin.to_owned())),
        }
    }

    fn is_local(&self, origin: &str, url: &Url) -> bool {
        let local_host = match url.host() {
            Some(Host::Domain(domain)) => domain == "localhost",
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        };
        let origin = origin.trim_end_matches('/');
        local_host || self.local_origins.iter().any(|o| o.trim_end_matches('/') == origin)
    }

    /// Reads the tenant a token claims to belong to, without verifying the
    /// token.
    ///
    /// `authorization` may carry a `"Bearer "` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] if the token payload cannot be
    /// decoded, [`AuthError::ClaimMissing`] if the tenant claim is absent,
    /// null or empty, and [`AuthError::UnresolvedTenant`] if it is not a
    /// valid tenant id.
    pub fn resolve_claim(&self, authorization: &str) -> Result<TenantId, AuthError> {
        let token = crate::jwt::strip_bearer(authorization);
        let claims = decode_unverified_claims(token)?;
        let candidate = claims.require(&self.tenant_claim)?;
        TenantId::parse(candidate).map_err(|e| {
            tracing::warn!(claim = %self.tenant_claim, error = %e, "Tenant claim is not a tenant id");
            AuthError::unresolved_tenant(e.to_string())
        })
    }

    /// Returns the name of the claim carrying the tenant id.
    #[must_use]
    pub fn tenant_claim(&self) -> &str {
        &self.tenant_claim
    }
}

fn first_label_tenant(host: &str) -> Resolution {
    let label = host.split('.').next().unwrap_or_default();
    match TenantId::parse(label) {
        Ok(tenant_id) => Resolution::Resolved(tenant_id),
        Err(e) => Resolution::Unresolved(UnresolvedReason::InvalidLabel {
            label: label.to_owned(),
            reason: e.reason,
        }),
    }
}
