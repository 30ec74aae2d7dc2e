//! Authentication configuration.
//!
//! Construct with [`AuthnConfig::builder()`], which validates, or
//! deserialize and call [`AuthnConfig::validate`]. Durations use
//! humantime notation (`"2s"`, `"5m"`) when deserialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Header carrying the bearer credential.
pub const DEFAULT_IDENTITY_HEADER: &str = "Authorization";

/// Claim carrying the end-user's username.
pub const DEFAULT_USERNAME_CLAIM: &str = "cognito:username";

/// Claim carrying the tenant id.
pub const DEFAULT_TENANT_CLAIM: &str = "custom:tenant-id";

/// Connect timeout for key set fetches.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Read timeout for key set fetches.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a fetched key set is served before it is fetched again.
pub const DEFAULT_KEY_SET_TTL: Duration = Duration::from_secs(300);

/// How long a key set may be served while its issuer is unreachable.
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(900);

/// Minimum spacing of forced refreshes per issuer.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum number of issuers with a cached key set.
pub const DEFAULT_MAX_CACHED_ISSUERS: u64 = 10_000;

/// Clock skew allowed on `exp` and `nbf`.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// Environment variable that sets
/// [`dev_fallback_tenant_host`](AuthnConfig::dev_fallback_tenant_host).
pub const DEV_FALLBACK_HOST_ENV: &str = "TENANTGATE_DEV_FALLBACK_TENANT_HOST";

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_owned()
}

fn default_username_claim() -> String {
    DEFAULT_USERNAME_CLAIM.to_owned()
}

fn default_tenant_claim() -> String {
    DEFAULT_TENANT_CLAIM.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_key_set_ttl() -> Duration {
    DEFAULT_KEY_SET_TTL
}

fn default_fallback_ttl() -> Option<Duration> {
    Some(DEFAULT_FALLBACK_TTL)
}

fn default_min_refresh_interval() -> Duration {
    DEFAULT_MIN_REFRESH_INTERVAL
}

fn default_max_cached_issuers() -> u64 {
    DEFAULT_MAX_CACHED_ISSUERS
}

fn default_leeway() -> Duration {
    DEFAULT_LEEWAY
}

fn default_local_origins() -> Vec<String> {
    vec!["http://localhost:4200".to_owned()]
}

/// Configuration of tenant resolution, key caching and token verification.
///
/// # Validation
///
/// - `identity_header` must be a valid HTTP header name
/// - `username_claim` and `tenant_claim` must not be empty
/// - `connect_timeout`, `read_timeout` and `key_set_ttl` must be non-zero
/// - `fallback_ttl`, when set, must be at least `key_set_ttl`
/// - `max_cached_issuers` must be `>= 1`
/// - `dev_fallback_tenant_host`, when set, must be a bare host name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthnConfig {
    /// Header carrying the bearer credential.
    #[serde(default = "default_identity_header")]
    pub(crate) identity_header: String,

    /// Claim carrying the username.
    #[serde(default = "default_username_claim")]
    pub(crate) username_claim: String,

    /// Claim carrying the tenant id.
    #[serde(default = "default_tenant_claim")]
    pub(crate) tenant_claim: String,

    /// Whether a token without a username is rejected.
    #[serde(default = "default_true")]
    pub(crate) require_username: bool,

    /// Connect timeout for key set fetches.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Read timeout for key set fetches.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub(crate) read_timeout: Duration,

    /// Freshness window of a cached key set.
    #[serde(with = "humantime_serde", default = "default_key_set_ttl")]
    pub(crate) key_set_ttl: Duration,

    /// Stale-serving window during issuer outages. `None` disables it.
    #[serde(with = "humantime_serde", default = "default_fallback_ttl")]
    pub(crate) fallback_ttl: Option<Duration>,

    /// Minimum spacing of forced refreshes per issuer.
    #[serde(with = "humantime_serde", default = "default_min_refresh_interval")]
    pub(crate) min_refresh_interval: Duration,

    /// Maximum number of cached key sets.
    #[serde(default = "default_max_cached_issuers")]
    pub(crate) max_cached_issuers: u64,

    /// Allowed clock skew.
    #[serde(with = "humantime_serde", default = "default_leeway")]
    pub(crate) leeway: Duration,

    /// Host whose tenant answers requests from local origins.
    #[serde(default)]
    pub(crate) dev_fallback_tenant_host: Option<String>,

    /// Origins treated as local in addition to `localhost` and `127.0.0.1`.
    #[serde(default = "default_local_origins")]
    pub(crate) local_origins: Vec<String>,
}

impl Default for AuthnConfig {
    fn default() -> Self {
        Self {
            identity_header: default_identity_header(),
            username_claim: default_username_claim(),
            tenant_claim: default_tenant_claim(),
            require_username: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            key_set_ttl: DEFAULT_KEY_SET_TTL,
            fallback_ttl: Some(DEFAULT_FALLBACK_TTL),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            max_cached_issuers: DEFAULT_MAX_CACHED_ISSUERS,
            leeway: DEFAULT_LEEWAY,
            dev_fallback_tenant_host: None,
            local_origins: default_local_origins(),
        }
    }
}

#[bon::bon]
impl AuthnConfig {
    /// Creates a validated configuration.
    ///
    /// A zero `fallback_ttl` disables stale serving.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any value violates the rules listed on
    /// [`AuthnConfig`].
    #[builder]
    pub fn new(
        #[builder(into, default = default_identity_header())] identity_header: String,
        #[builder(into, default = default_username_claim())] username_claim: String,
        #[builder(into, default = default_tenant_claim())] tenant_claim: String,
        #[builder(default = true)] require_username: bool,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_READ_TIMEOUT)] read_timeout: Duration,
        #[builder(default = DEFAULT_KEY_SET_TTL)] key_set_ttl: Duration,
        #[builder(default = DEFAULT_FALLBACK_TTL)] fallback_ttl: Duration,
        #[builder(default = DEFAULT_MIN_REFRESH_INTERVAL)] min_refresh_interval: Duration,
        #[builder(default = DEFAULT_MAX_CACHED_ISSUERS)] max_cached_issuers: u64,
        #[builder(default = DEFAULT_LEEWAY)] leeway: Duration,
        #[builder(into)] dev_fallback_tenant_host: Option<String>,
        #[builder(default = default_local_origins())] local_origins: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            identity_header,
            username_claim,
            tenant_claim,
            require_username,
            connect_timeout,
            read_timeout,
            key_set_ttl,
            fallback_ttl: (!fallback_ttl.is_zero()).then_some(fallback_ttl),
            min_refresh_interval,
            max_cached_issuers,
            leeway,
            dev_fallback_tenant_host,
            local_origins,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against the rules listed on [`AuthnConfig`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if http::HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(ConfigError::invalid("identity_header", "not a valid header name"));
        }
        if self.username_claim.is_empty() {
            return Err(ConfigError::invalid("username_claim", "must not be empty"));
        }
        if self.tenant_claim.is_empty() {
            return Err(ConfigError::invalid("tenant_claim", "must not be empty"));
        }
        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("key_set_ttl", self.key_set_ttl),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be non-zero"));
            }
        }
        if let Some(fallback_ttl) = self.fallback_ttl
            && fallback_ttl < self.key_set_ttl
        {
            return Err(ConfigError::invalid(
                "fallback_ttl",
                format!("{fallback_ttl:?} is shorter than key_set_ttl {:?}", self.key_set_ttl),
            ));
        }
        if self.max_cached_issuers == 0 {
            return Err(ConfigError::invalid("max_cached_issuers", "must be >= 1"));
        }
        if let Some(host) = &self.dev_fallback_tenant_host {
            validate_bare_host(host)?;
        }
        Ok(())
    }

    /// Replaces `dev_fallback_tenant_host` with the value of
    /// [`DEV_FALLBACK_HOST_ENV`] when that variable is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the variable does not hold a bare host.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Like [`apply_env`](Self::apply_env), reading variables through
    /// `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the variable does not hold a bare host.
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(host) = lookup(DEV_FALLBACK_HOST_ENV) {
            let host = host.trim();
            if host.is_empty() {
                self.dev_fallback_tenant_host = None;
            } else {
                validate_bare_host(host)?;
                tracing::warn!(host, "Local origins resolve to a development fallback tenant");
                self.dev_fallback_tenant_host = Some(host.to_owned());
            }
        }
        Ok(self)
    }

    /// Returns the header carrying the bearer credential.
    #[must_use]
    pub fn identity_header(&self) -> &str {
        &self.identity_header
    }

    /// Returns the username claim name.
    #[must_use]
    pub fn username_claim(&self) -> &str {
        &self.username_claim
    }

    /// Returns the tenant claim name.
    #[must_use]
    pub fn tenant_claim(&self) -> &str {
        &self.tenant_claim
    }

    /// Returns whether a username claim is required.
    #[must_use]
    pub fn require_username(&self) -> bool {
        self.require_username
    }

    /// Returns the key set connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the key set read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the key set freshness window.
    #[must_use]
    pub fn key_set_ttl(&self) -> Duration {
        self.key_set_ttl
    }

    /// Returns the stale-serving window, if enabled.
    #[must_use]
    pub fn fallback_ttl(&self) -> Option<Duration> {
        self.fallback_ttl
    }

    /// Returns the minimum forced-refresh spacing.
    #[must_use]
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }

    /// Returns the key set cache capacity.
    #[must_use]
    pub fn max_cached_issuers(&self) -> u64 {
        self.max_cached_issuers
    }

    /// Returns the allowed clock skew.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Returns the development fallback host.
    #[must_use]
    pub fn dev_fallback_tenant_host(&self) -> Option<&str> {
        self.dev_fallback_tenant_host.as_deref()
    }

    /// Returns the extra local origins.
    #[must_use]
    pub fn local_origins(&self) -> &[String] {
        &self.local_origins
    }
}

fn validate_bare_host(host: &str) -> Result<(), ConfigError> {
    if host.contains("://") || host.contains('/') || host.contains(':') {
        return Err(ConfigError::invalid(
            "dev_fallback_tenant_host",
            format!("'{host}' must be a host name without scheme, port or path"),
        ));
    }
    match url::Host::parse(host) {
        Ok(url::Host::Domain(_)) => Ok(()),
        Ok(_) => Err(ConfigError::invalid(
            "dev_fallback_tenant_host",
            format!("'{host}' is an IP address"),
        )),
        Err(e) => Err(ConfigError::invalid("dev_fallback_tenant_host", format!("'{host}': {e}"))),
    }
}
