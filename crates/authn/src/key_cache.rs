//! Per-issuer cache of published signing keys.
//!
//! This module provides [`JwksKeyCache`], which wraps a [`KeySetFetcher`]
//! with in-memory caching so that token verification does not reach the
//! identity provider on every request.
//!
//! # Architecture
//!
//! ```text
//! token arrives → tenant's issuer + kid
//!              → check key set cache (L1, keyed by issuer)
//!              → miss? one fetch per issuer, concurrent callers wait on it
//!              → kid not in set? one forced refresh, rate-limited per issuer
//!              → issuer unreachable? serve last good set from fallback (L2)
//! ```
//!
//! # Cache Strategy
//!
//! - **L1 TTL**: default 5 minutes
//! - **L2 fallback TTL**: default 15 minutes, used only for connection
//!   errors, timeouts and 5xx responses
//! - **Isolation**: entries are keyed by the full issuer URL, so a `kid`
//!   published by one issuer never verifies a token of another
//! - **Errors**: failed fetches are never cached
//!
//! # Examples
//!
//! ```no_run
//! use tenantgate_authn::{AuthnConfig, JwksKeyCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthnConfig::default();
//! let cache = JwksKeyCache::from_config(&config)?;
//!
//! let key = cache.get_key("https://idp/pools/us-east-1_ABC", "key-2024-01").await?;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use fail::fail_point;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet, KeyAlgorithm, PublicKeyUse},
};
use moka::future::Cache;
use parking_lot::Mutex;

use crate::{
    config::AuthnConfig,
    error::AuthError,
    jwks::{HttpKeySetFetcher, KeyFetchError, KeySetFetcher},
};

/// The usable RS256 signing keys of one issuer, as of one fetch.
pub struct CachedKeySet {
    issuer: String,
    keys: HashMap<String, Arc<DecodingKey>>,
    fetched_at: Instant,
    generation: u64,
}

impl CachedKeySet {
    /// Builds a key set from a JWKS document.
    ///
    /// Keeps only keys with a `kid`, RSA key material, `alg` absent or
    /// `RS256`, and `use` absent or `sig`. The first key with a given `kid`
    /// wins.
    #[must_use]
    pub fn from_jwks(issuer: &str, jwks: &JwkSet, generation: u64) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.as_deref() else {
                tracing::debug!(issuer, "Skipping JWK without kid");
                continue;
            };
            let use_ok =
                jwk.common.public_key_use.as_ref().is_none_or(|u| matches!(u, PublicKeyUse::Signature));
            if !use_ok {
                tracing::debug!(issuer, kid, "Skipping JWK not meant for signatures");
                continue;
            }
            let alg_ok =
                jwk.common.key_algorithm.as_ref().is_none_or(|alg| matches!(alg, KeyAlgorithm::RS256));
            if !alg_ok {
                tracing::debug!(issuer, kid, "Skipping JWK with non-RS256 alg");
                continue;
            }
            let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
                tracing::debug!(issuer, kid, "Skipping non-RSA JWK");
                continue;
            };
            match DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                Ok(key) => {
                    if keys.contains_key(kid) {
                        tracing::debug!(issuer, kid, "Ignoring duplicate kid");
                    } else {
                        keys.insert(kid.to_owned(), Arc::new(key));
                    }
                },
                Err(e) => tracing::debug!(issuer, kid, error = %e, "Skipping unusable RSA JWK"),
            }
        }

        Self { issuer: issuer.to_owned(), keys, fetched_at: Instant::now(), generation }
    }

    /// The issuer the keys were fetched from.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the key with `kid`.
    #[must_use]
    pub fn key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        self.keys.get(kid).cloned()
    }

    /// Whether a key with `kid` is present.
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// The key ids in the set, unordered.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the issuer published no usable key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the set was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Monotonic fetch counter; a refreshed set has a higher generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for CachedKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<_> = self.kids().collect();
        kids.sort_unstable();
        f.debug_struct("CachedKeySet")
            .field("issuer", &self.issuer)
            .field("kids", &kids)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Cache of issuer key sets for token verification.
///
/// An explicit instance: construct one per process and share it through an
/// [`Arc`].
///
/// # Concurrency
///
/// Concurrent misses for one issuer share a single fetch. If the caller
/// driving that fetch is cancelled, a waiting caller takes it over. Forced
/// refreshes coalesce the same way, and their result is reused until the
/// minimum refresh interval has passed.
pub struct JwksKeyCache {
    fetcher: Arc<dyn KeySetFetcher>,
    cache: Cache<String, Arc<CachedKeySet>>,
    fallback: Option<Cache<String, Arc<CachedKeySet>>>,
    refresh_gate: Option<Cache<String, Arc<CachedKeySet>>>,
    next_generation: AtomicU64,
    invalidations: Invalidations,
}

/// Snapshot of the invalidation counters seen by one issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    cleared: u64,
    issuer: u64,
}

/// Invalidation counters: one bumped by [`JwksKeyCache::clear_all`], and one
/// per issuer bumped by [`JwksKeyCache::invalidate`].
///
/// Only issuers that were invalidated since the last clear have an entry.
#[derive(Default)]
struct Invalidations {
    cleared: AtomicU64,
    per_issuer: Mutex<HashMap<String, u64>>,
}

impl Invalidations {
    fn epoch(&self, issuer: &str) -> Epoch {
        Epoch {
            cleared: self.cleared.load(Ordering::Acquire),
            issuer: self.per_issuer.lock().get(issuer).copied().unwrap_or(0),
        }
    }

    fn bump(&self, issuer: &str) {
        *self.per_issuer.lock().entry(issuer.to_owned()).or_insert(0) += 1;
    }

    // A new `cleared` value already differs from every earlier epoch, so the
    // per-issuer counters can start over.
    fn bump_all(&self) {
        let mut per_issuer = self.per_issuer.lock();
        self.cleared.fetch_add(1, Ordering::Release);
        per_issuer.clear();
    }
}

impl JwksKeyCache {
    /// Creates a cache over `fetcher` with the TTLs of `config`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, config: &AuthnConfig) -> Self {
        let capacity = config.max_cached_issuers();
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(config.key_set_ttl())
            .build();
        let fallback = config
            .fallback_ttl()
            .map(|ttl| Cache::builder().max_capacity(capacity).time_to_live(ttl).build());
        let refresh_gate = (!config.min_refresh_interval().is_zero()).then(|| {
            Cache::builder()
                .max_capacity(capacity)
                .time_to_live(config.min_refresh_interval())
                .build()
        });

        Self {
            fetcher,
            cache,
            fallback,
            refresh_gate,
            next_generation: AtomicU64::new(0),
            invalidations: Invalidations::default(),
        }
    }

    /// Creates a cache fetching over HTTPS with the timeouts of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthnConfig) -> Result<Self, KeyFetchError> {
        let fetcher = HttpKeySetFetcher::from_config(config)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Returns the key set of `issuer`, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetch`] if the set cannot be fetched and no
    /// fallback applies.
    #[tracing::instrument(skip(self))]
    pub async fn get_keys(&self, issuer: &str) -> Result<Arc<CachedKeySet>, AuthError> {
        self.load(issuer).await.map_err(|err| AuthError::key_fetch(issuer, err))
    }

    async fn load(&self, issuer: &str) -> Result<Arc<CachedKeySet>, KeyFetchError> {
        if let Some(set) = self.cache.get(issuer).await {
            tracing::debug!(cache = "L1", "cache hit");
            return Ok(set);
        }
        tracing::debug!(cache = "L1", "cache miss");

        // Snapshot before the fetch; invalidating this issuer changes it.
        let epoch = self.invalidations.epoch(issuer);

        match self.cache.try_get_with(issuer.to_owned(), self.fetch(issuer, epoch)).await {
            Ok(set) => {
                if self.invalidations.epoch(issuer) != epoch {
                    tracing::debug!("Discarding fetched key set: invalidated during fetch");
                    self.cache.invalidate(issuer).await;
                }
                Ok(set)
            },
            Err(err) => {
                let err = KeyFetchError::clone(&err);
                if err.is_transient()
                    && let Some(fallback) = &self.fallback
                    && let Some(set) = fallback.get(issuer).await
                {
                    tracing::warn!(
                        cache = "L2",
                        fallback_age_secs = set.fetched_at().elapsed().as_secs(),
                        error = %err,
                        "cache hit (fallback), issuer unavailable"
                    );
                    return Ok(set);
                }
                tracing::warn!(error = %err, "Key set fetch failed");
                Err(err)
            },
        }
    }

    async fn fetch(&self, issuer: &str, epoch: Epoch) -> Result<Arc<CachedKeySet>, KeyFetchError> {
        fail_point!("jwks-before-fetch", |_| {
            Err(KeyFetchError::Connect("injected failure before key set fetch".into()))
        });

        let jwks = self.fetcher.fetch(issuer).await?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let set = Arc::new(CachedKeySet::from_jwks(issuer, &jwks, generation));

        if set.is_empty() {
            tracing::warn!(issuer, "Issuer published no usable RS256 signing key");
        }

        if self.invalidations.epoch(issuer) == epoch
            && let Some(fallback) = &self.fallback
        {
            fallback.insert(issuer.to_owned(), Arc::clone(&set)).await;
        }

        tracing::debug!(cache = "origin", keys = set.len(), generation, "fetched key set");
        Ok(set)
    }

    /// Returns the key `kid` of `issuer`.
    ///
    /// A `kid` missing from the cached set triggers one forced
    /// [`refresh`](Self::refresh) before the lookup fails.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignatureVerification`] if the issuer does not
    /// publish `kid`, or [`AuthError::KeyFetch`] if the set is unavailable.
    #[tracing::instrument(skip(self))]
    pub async fn get_key(&self, issuer: &str, kid: &str) -> Result<Arc<DecodingKey>, AuthError> {
        let set = self.get_keys(issuer).await?;
        if let Some(key) = set.key(kid) {
            return Ok(key);
        }

        tracing::debug!("kid not in cached key set, forcing refresh");
        let refreshed = self.refresh(issuer, &set).await?;
        refreshed.key(kid).ok_or_else(|| {
            AuthError::signature_verification(format!("issuer publishes no key with kid '{kid}'"))
        })
    }

    /// Replaces `stale` with a fresh fetch.
    ///
    /// If the cache already holds a newer set, that set is returned. Forced
    /// fetches for one issuer are at least the configured minimum refresh
    /// interval apart; a throttled call returns the set of the last forced
    /// fetch, or the current set if that is newer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetch`] if the set cannot be fetched and no
    /// fallback applies.
    #[tracing::instrument(skip(self, stale), fields(stale_generation = stale.generation))]
    pub async fn refresh(
        &self,
        issuer: &str,
        stale: &CachedKeySet,
    ) -> Result<Arc<CachedKeySet>, AuthError> {
        if let Some(current) = self.cache.get(issuer).await
            && current.generation != stale.generation
        {
            tracing::debug!("key set already refreshed");
            return Ok(current);
        }

        let Some(gate) = &self.refresh_gate else {
            self.cache.invalidate(issuer).await;
            return self.get_keys(issuer).await;
        };

        let refreshed = gate
            .try_get_with(issuer.to_owned(), async {
                self.cache.invalidate(issuer).await;
                self.load(issuer).await
            })
            .await
            .map_err(|err| AuthError::key_fetch(issuer, KeyFetchError::clone(&err)))?;

        if refreshed.generation < stale.generation {
            tracing::debug!("forced refresh throttled");
            return self.get_keys(issuer).await;
        }
        Ok(refreshed)
    }

    /// Drops every key set held for `issuer`: cached, fallback and the
    /// result of the last forced refresh.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self, issuer: &str) {
        self.invalidations.bump(issuer);
        self.cache.invalidate(issuer).await;
        if let Some(fallback) = &self.fallback {
            fallback.invalidate(issuer).await;
        }
        if let Some(gate) = &self.refresh_gate {
            gate.invalidate(issuer).await;
        }
        tracing::info!(
            audit.action = "invalidate_key_set",
            audit.resource = %format_args!("issuer:{issuer}"),
            audit.result = "success",
            "audit_event"
        );
    }

    /// Drops every key set of every issuer.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) {
        let l1_count = self.cache.entry_count();
        let fallback_count = self.fallback_entry_count();
        self.invalidations.bump_all();
        self.cache.invalidate_all();
        if let Some(fallback) = &self.fallback {
            fallback.invalidate_all();
        }
        if let Some(gate) = &self.refresh_gate {
            gate.invalidate_all();
        }
        tracing::info!(
            audit.action = "clear_key_sets",
            audit.resource = "all_issuers",
            audit.result = "success",
            audit.l1_evicted = l1_count,
            audit.l2_evicted = fallback_count,
            "audit_event"
        );
    }

    /// Approximate number of cached key sets.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Approximate number of fallback key sets.
    #[must_use]
    pub fn fallback_entry_count(&self) -> u64 {
        self.fallback.as_ref().map_or(0, |fallback| fallback.entry_count())
    }

    /// The TTL of a cached key set.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.cache.policy().time_to_live()
    }

    /// Synchronizes pending cache operations.
    ///
    /// Call this before checking entry counts in tests.
    #[cfg(any(test, feature = "testutil"))]
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
        if let Some(fallback) = &self.fallback {
            fallback.run_pending_tasks().await;
        }
    }

    /// Clears only the L1 cache, leaving fallback entries in place.
    #[cfg(any(test, feature = "testutil"))]
    pub async fn clear_l1(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl fmt::Debug for JwksKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksKeyCache")
            .field("entries", &self.cache.entry_count())
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}
