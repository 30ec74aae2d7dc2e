//! Tenant identity-provider record.
//!
//! A [`TenantRecord`] binds one tenant to the identity-provider pool that
//! issues its tokens. The issuer URL, pool id and region are mutually
//! derivable:
//!
//! ```text
//! auth_server_url  = https://idp.example.com/pools/us-east-1_ABC
//! provider_pool_id =                               us-east-1_ABC
//! region           =                               us-east-1
//! ```
//!
//! Records written by external onboarding tooling may violate this; callers
//! must go through [`TenantRecord::expected_issuer`] before trusting one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TenantId;

/// Separator between the region and the pool-specific suffix of a pool id.
pub const REGION_DELIMITER: char = '_';

/// Errors raised while building or checking a [`TenantRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The issuer URL carries no pool id segment.
    #[error("issuer '{url}' has no pool id segment")]
    MissingPoolId {
        /// The offending issuer URL.
        url: String,
    },

    /// The pool id carries no region prefix.
    #[error("pool id '{pool_id}' has no region prefix")]
    MissingRegion {
        /// The offending pool id.
        pool_id: String,
    },

    /// Stored fields disagree with each other.
    #[error("record for tenant '{tenant_id}' is inconsistent: {reason}")]
    Inconsistent {
        /// Tenant whose record is inconsistent.
        tenant_id: TenantId,
        /// Which fields disagree.
        reason: String,
    },
}

/// Browser-client settings served by the pre-authentication endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct AuthClientSettings {
    /// OAuth client id registered with the tenant's pool.
    #[builder(into)]
    pub client_id: String,

    /// Redirect URI after login.
    #[builder(into)]
    pub redirect_uri: String,

    /// Whether the client refreshes tokens through a hidden iframe.
    #[serde(default)]
    #[builder(default)]
    pub use_silent_refresh: bool,

    /// Silent refresh timeout in milliseconds.
    #[serde(default = "default_silent_refresh_timeout_ms")]
    #[builder(default = default_silent_refresh_timeout_ms())]
    pub silent_refresh_timeout_ms: u64,

    /// Whether the client polls the provider's session state.
    #[serde(default)]
    #[builder(default)]
    pub session_checks_enabled: bool,

    /// Whether the client logs protocol debug output.
    #[serde(default)]
    #[builder(default)]
    pub show_debug_information: bool,

    /// Whether the URL fragment is cleared once login completes.
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub clear_hash_after_login: bool,

    /// Hosted login domain of the pool, if it has one.
    #[serde(default)]
    #[builder(into)]
    pub provider_domain: Option<String>,
}

fn default_silent_refresh_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

/// One tenant's identity-provider binding.
///
/// # Examples
///
/// ```
/// use tenantgate_directory::{TenantId, TenantRecord};
///
/// let record = TenantRecord::builder()
///     .tenant_id(TenantId::parse("acmecorp")?)
///     .auth_server_url("https://idp/pools/us-east-1_ABC")
///     .plan("premium")
///     .build()?;
///
/// assert_eq!(record.provider_pool_id, "us-east-1_ABC");
/// assert_eq!(record.region, "us-east-1");
/// assert_eq!(record.expected_issuer()?, "https://idp/pools/us-east-1_ABC");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantRecord {
    /// Primary key.
    pub tenant_id: TenantId,

    /// Full issuer URL of the tenant's identity-provider pool.
    pub auth_server_url: String,

    /// Region prefix of [`provider_pool_id`](Self::provider_pool_id).
    pub region: String,

    /// Last path segment of [`auth_server_url`](Self::auth_server_url).
    pub provider_pool_id: String,

    /// Subscription tier.
    #[serde(default)]
    pub plan: String,

    /// Browser-client settings, if the tenant has a web client.
    #[serde(default)]
    pub auth_client: Option<AuthClientSettings>,
}

#[bon::bon]
impl TenantRecord {
    /// Builds a record, deriving `provider_pool_id` and `region` from
    /// `auth_server_url` when they are not given.
    ///
    /// Explicit values are stored as given, even when they disagree with
    /// the issuer URL; [`expected_issuer`](Self::expected_issuer) catches
    /// that later.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingPoolId`] or [`RecordError::MissingRegion`]
    /// when a value has to be derived and the issuer URL does not carry it.
    #[builder]
    pub fn new(
        tenant_id: TenantId,
        #[builder(into)] auth_server_url: String,
        #[builder(into)] provider_pool_id: Option<String>,
        #[builder(into)] region: Option<String>,
        #[builder(into, default)] plan: String,
        auth_client: Option<AuthClientSettings>,
    ) -> Result<Self, RecordError> {
        let provider_pool_id = match provider_pool_id {
            Some(pool_id) => pool_id,
            None => pool_id_from_issuer(&auth_server_url)
                .ok_or_else(|| RecordError::MissingPoolId { url: auth_server_url.clone() })?
                .to_owned(),
        };
        let region = match region {
            Some(region) => region,
            None => region_from_pool_id(&provider_pool_id)
                .ok_or_else(|| RecordError::MissingRegion { pool_id: provider_pool_id.clone() })?
                .to_owned(),
        };

        Ok(Self { tenant_id, auth_server_url, region, provider_pool_id, plan, auth_client })
    }

    /// Returns the issuer every token of this tenant must carry, after
    /// checking that the stored fields agree with each other.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Inconsistent`] when the pool id is not the last
    /// path segment of the issuer URL, or when the region is not the pool
    /// id's prefix.
    pub fn expected_issuer(&self) -> Result<&str, RecordError> {
        let inconsistent = |reason: String| RecordError::Inconsistent {
            tenant_id: self.tenant_id.clone(),
            reason,
        };

        if !self.auth_server_url.starts_with("https://")
            && !self.auth_server_url.starts_with("http://")
        {
            return Err(inconsistent("auth_server_url is not an http(s) URL".into()));
        }

        match pool_id_from_issuer(&self.auth_server_url) {
            Some(pool_id) if pool_id == self.provider_pool_id => {},
            other => {
                return Err(inconsistent(format!(
                    "provider_pool_id '{}' does not match issuer segment {:?}",
                    self.provider_pool_id, other
                )));
            },
        }

        match region_from_pool_id(&self.provider_pool_id) {
            Some(region) if region == self.region => Ok(&self.auth_server_url),
            other => Err(inconsistent(format!(
                "region '{}' does not match pool id prefix {:?}",
                self.region, other
            ))),
        }
    }
}

/// Returns the pool id of an issuer URL: the non-empty segment after its
/// last `/`.
///
/// ```
/// use tenantgate_directory::record::pool_id_from_issuer;
///
/// assert_eq!(pool_id_from_issuer("https://idp/pools/us-east-1_ABC"), Some("us-east-1_ABC"));
/// assert_eq!(pool_id_from_issuer("https://idp/pools/"), None);
/// ```
#[must_use]
pub fn pool_id_from_issuer(issuer: &str) -> Option<&str> {
    let (base, pool_id) = issuer.rsplit_once('/')?;
    // "https://host" splits inside the scheme separator
    if pool_id.is_empty() || (base.ends_with('/') && base.len() <= "https:/".len()) {
        return None;
    }
    Some(pool_id)
}

/// Returns the region prefix of a pool id: everything before its first `_`.
#[must_use]
pub fn region_from_pool_id(pool_id: &str) -> Option<&str> {
    match pool_id.split_once(REGION_DELIMITER) {
        Some((region, _)) if !region.is_empty() => Some(region),
        _ => None,
    }
}
