//! Read-through cache wrapper for tenant directories.
//!
//! [`CachedTenantDirectory`] wraps any [`TenantDirectory`] with a [`moka`]
//! TTL cache. Concurrent lookups of the same uncached tenant share one
//! backend read.
//!
//! # Design
//!
//! - **Hits only**: present records are cached; missing tenants are not, so a tenant onboarded
//!   after a miss becomes visible on the next request.
//! - **Errors are never cached**: a failed backend read is reported to every waiter of that read
//!   and the next lookup tries again.
//! - **Explicit invalidation**: administrative updates call
//!   [`invalidate`](CachedTenantDirectory::invalidate) so the next lookup re-reads the record.
//!
//! # Usage
//!
//! ```no_run
//! # use std::time::Duration;
//! # use tenantgate_directory::{CacheConfig, CachedTenantDirectory, MemoryTenantDirectory};
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::builder()
//!     .max_entries(10_000)
//!     .ttl(Duration::from_secs(60))
//!     .build()?;
//! let cached = CachedTenantDirectory::new(MemoryTenantDirectory::new(), config);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::trace;

use crate::{
    TenantDirectory,
    error::{ConfigError, DirectoryError, DirectoryResult},
    record::TenantRecord,
    types::TenantId,
};

// ───────────────────────────────────────────────────────────────────────────
// CacheConfig
// ───────────────────────────────────────────────────────────────────────────

/// Default maximum number of cached records.
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default record TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Minimum allowed record TTL.
const MIN_TTL: Duration = Duration::from_secs(1);

/// Configuration for the read-through cache.
///
/// # Validation
///
/// - `max_entries` must be >= 1
/// - `ttl` must be >= 1 second
///
/// Use [`CacheConfig::disabled()`] for a pass-through wrapper.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    max_entries: u64,
    ttl: Duration,
    enabled: bool,
}

impl CacheConfig {
    /// Starts a validated cache configuration.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL }
    }

    /// Creates a disabled cache configuration.
    pub fn disabled() -> Self {
        Self { max_entries: 0, ttl: Duration::ZERO, enabled: false }
    }

    /// Returns the maximum number of cached records.
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Returns the record TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns whether caching is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL, enabled: true }
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    max_entries: u64,
    ttl: Duration,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of cached records.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the record TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds the [`CacheConfig`], validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `max_entries` is 0
    /// - `ttl` is less than 1 second
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        if self.ttl < MIN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                value: format!("{}ms", self.ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        Ok(CacheConfig { max_entries: self.max_entries, ttl: self.ttl, enabled: true })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// CachedTenantDirectory
// ───────────────────────────────────────────────────────────────────────────

/// Outcome of a cache fill that did not produce a record.
enum FillMiss {
    Absent,
    Failed(DirectoryError),
}

/// A read-through caching wrapper around any [`TenantDirectory`].
pub struct CachedTenantDirectory<D> {
    inner: D,
    cache: Option<Cache<TenantId, TenantRecord>>,
    config: CacheConfig,
}

impl<D: TenantDirectory> CachedTenantDirectory<D> {
    /// Creates a new cached directory.
    ///
    /// A [`CacheConfig::disabled()`] config allocates no cache.
    pub fn new(inner: D, config: CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder().max_capacity(config.max_entries).time_to_live(config.ttl).build()
        });
        Self { inner, cache, config }
    }

    /// Returns a reference to the wrapped directory.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drops one tenant's cached record.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn invalidate(&self, tenant_id: &TenantId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(tenant_id).await;
        }
        tracing::info!(
            audit.action = "invalidate_tenant_record",
            audit.resource = %tenant_id,
            audit.result = "success",
            "audit_event"
        );
    }

    /// Drops every cached record.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Returns the number of cached records (eventually consistent).
    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, Cache::entry_count)
    }

    /// Processes pending cache maintenance so counts are exact.
    pub async fn sync(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks().await;
        }
    }
}

#[async_trait]
impl<D: TenantDirectory> TenantDirectory for CachedTenantDirectory<D> {
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn lookup(&self, tenant_id: &TenantId) -> DirectoryResult<Option<TenantRecord>> {
        let Some(cache) = &self.cache else {
            return self.inner.lookup(tenant_id).await;
        };

        if let Some(record) = cache.get(tenant_id).await {
            trace!("directory cache hit");
            return Ok(Some(record));
        }
        trace!("directory cache miss");

        let fill = cache
            .try_get_with(tenant_id.clone(), async {
                match self.inner.lookup(tenant_id).await {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => Err(FillMiss::Absent),
                    Err(err) => Err(FillMiss::Failed(err)),
                }
            })
            .await;

        match fill {
            Ok(record) => Ok(Some(record)),
            Err(miss) => match miss.as_ref() {
                FillMiss::Absent => Ok(None),
                FillMiss::Failed(err) => Err(err.clone()),
            },
        }
    }
}
